use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;

use crate::config::ServerConfig;
use crate::db::SessionRow;

/// Shared application state.
pub struct AppState {
    pub db: SqlitePool,
    pub config: ServerConfig,
    /// Sessions already validated against the database, keyed by token.
    pub sessions: DashMap<String, SessionRow>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        Self {
            db,
            config,
            sessions: DashMap::new(),
        }
    }

    /// Cached session for `token`, evicting it if it has expired.
    pub fn cached_session(&self, token: &str) -> Option<SessionRow> {
        let session = self.sessions.get(token).map(|entry| entry.value().clone())?;
        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// Drop expired entries from the in-memory cache. Returns how many went.
    pub fn prune_sessions(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        before - self.sessions.len()
    }
}
