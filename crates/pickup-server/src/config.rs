//! Runtime settings read from the environment.

use std::env;
use std::str::FromStr;

use tracing::warn;

const DEFAULT_DATABASE_URL: &str = "sqlite:pickup.db?mode=rwc";

/// Immutable server configuration shared through [`crate::state::AppState`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub max_db_connections: u32,
    pub session_ttl_days: i64,
    /// Accept name-only sign-ins on `/auth/demo`.
    pub demo_login: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 8080,
            max_db_connections: 5,
            session_ttl_days: 30,
            demo_login: true,
        }
    }
}

impl ServerConfig {
    /// Load settings from `DATABASE_URL`, `PORT`, `DB_MAX_CONNECTIONS`,
    /// `SESSION_TTL_DAYS` and `DEMO_LOGIN`, keeping defaults for anything
    /// missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parsed("PORT", defaults.port),
            max_db_connections: parsed("DB_MAX_CONNECTIONS", defaults.max_db_connections),
            session_ttl_days: parsed("SESSION_TTL_DAYS", defaults.session_ttl_days),
            demo_login: env::var("DEMO_LOGIN")
                .map(|value| !matches!(value.trim(), "0" | "false" | "off"))
                .unwrap_or(defaults.demo_login),
        }
    }

    /// Settings for an isolated in-memory database, used by tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_db_connections: 1,
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

fn parsed<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, %default, "ignoring unparseable setting");
                default
            }
        },
        Err(_) => default,
    }
}
