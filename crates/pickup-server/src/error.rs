use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pickup_core::ScheduleError;
use pickup_core::protocol::ErrorBody;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors returned by handlers, rendered as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Storage failures; the cause is logged, never sent to the client.
    #[error("Internal server error")]
    Database(#[from] sqlx::Error),
    #[error("Internal server error")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::BadRequest(describe_validation(&errors))
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        // Stored games are validated on creation, so this is corrupt data.
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Database(err) => tracing::error!(error = %err, "database error"),
            AppError::Internal(detail) => tracing::error!(%detail, "internal error"),
            _ => {}
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// First message per invalid field, sorted by field name.
fn describe_validation(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let parts: Vec<String> = fields
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();

    if parts.is_empty() {
        "Invalid request".to_string()
    } else {
        parts.join("; ")
    }
}
