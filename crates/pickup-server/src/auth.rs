//! Sessions, password hashing and the authenticated-identity extractors.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use pickup_core::protocol::UserSummary;

use crate::db::{self, SessionRow};
use crate::error::AppError;
use crate::state::AppState;

/// The caller's identity, resolved once from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl AuthUser {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Identity for routes that also serve anonymous callers.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;
        resolve(state, token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => Ok(MaybeAuthUser(resolve(state, token).await?)),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve(state: &AppState, token: &str) -> Result<Option<AuthUser>, AppError> {
    let session = match state.cached_session(token) {
        Some(session) => session,
        None => match db::get_session(&state.db, token).await? {
            Some(session) => {
                state.sessions.insert(token.to_string(), session.clone());
                session
            }
            None => return Ok(None),
        },
    };

    Ok(Some(AuthUser {
        id: session.user.id,
        name: session.user.name,
        email: session.user.email,
        token: token.to_string(),
    }))
}

/// Create a session for `user` and warm the cache with it. Returns the token.
pub async fn issue_session(state: &AppState, user: UserSummary) -> Result<String, AppError> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::days(state.config.session_ttl_days);
    db::create_session(&state.db, &token, user.id, expires_at).await?;
    state
        .sessions
        .insert(token.clone(), SessionRow { user, expires_at });
    Ok(token)
}

pub async fn revoke_session(state: &AppState, token: &str) -> Result<(), AppError> {
    state.sessions.remove(token);
    db::delete_session(&state.db, token).await?;
    Ok(())
}

/// Random 64-character lowercase alphanumeric session token.
pub fn generate_token() -> String {
    random_string(64)
}

fn random_string(len: usize) -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// Argon2id hash of `password` in PHC string form, with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(&random_bytes::<16>())
        .map_err(|err| AppError::Internal(format!("encoding password salt: {err}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Internal(format!("hashing password: {err}")))
}

/// Constant-time check of `password` against a stored PHC hash.
/// Anything that does not parse as a PHC string never matches.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|hash| {
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    })
}

fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngExt;
    let mut rng = rand::rng();
    std::array::from_fn(|_| rng.random_range(0..=u8::MAX))
}

/// Email used for name-only demo accounts: lowercase, spaces removed.
pub fn demo_email(name: &str) -> String {
    let local: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("{local}@demo.com")
}

/// Display name derived from an email address.
pub fn default_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_alphanumeric() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn password_round_trip() {
        let stored = hash_password("hunter22").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("hunter22"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "garbage"));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let first = hash_password("secret1").unwrap();
        let second = hash_password("secret1").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("secret1", &first));
        assert!(verify_password("secret1", &second));
    }

    #[test]
    fn legacy_sha256_hashes_do_not_verify() {
        let legacy = format!("abcdefgh${}", "0".repeat(64));
        assert!(!verify_password("secret1", &legacy));
    }

    #[test]
    fn demo_email_strips_spaces() {
        assert_eq!(demo_email("Jane Doe"), "janedoe@demo.com");
        assert_eq!(default_name("pat@example.com"), "pat");
    }
}
