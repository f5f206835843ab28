pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build a fully configured Router + shared state.
pub async fn build_app(config: ServerConfig) -> Result<(Router, Arc<AppState>), sqlx::Error> {
    let mut options = SqlitePoolOptions::new().max_connections(config.max_db_connections);
    if config.is_in_memory() {
        // Every connection to `:memory:` is a separate database.
        options = options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = options.connect(&config.database_url).await?;

    db::init_db(&pool).await?;

    let state = Arc::new(AppState::new(pool, config));

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                cleanup(&state).await;
            }
        });
    }

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/auth/register", post(routes::register))
        .route("/auth/login", post(routes::login))
        .route("/auth/demo", post(routes::demo_login))
        .route("/auth/logout", post(routes::logout))
        .route("/games", get(routes::list_games).post(routes::create_game))
        .route("/games/{id}", get(routes::get_game))
        .route("/games/{id}/conflict", get(routes::check_game_conflict))
        .route("/games/{id}/join", post(routes::join_game))
        .route("/games/{id}/leave", post(routes::leave_game))
        .route("/dashboard", get(routes::dashboard))
        .route("/dashboard/organized", get(routes::dashboard_organized))
        .route("/dashboard/joined", get(routes::dashboard_joined))
        .route("/users/{id}", get(routes::profile))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    Ok((app, state))
}

/// Background task: drop expired sessions from the cache and the database.
async fn cleanup(state: &AppState) {
    let evicted = state.prune_sessions();
    match db::delete_expired_sessions(&state.db).await {
        Ok(deleted) if deleted > 0 || evicted > 0 => {
            info!(deleted, evicted, "pruned expired sessions");
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to prune expired sessions"),
    }
}
