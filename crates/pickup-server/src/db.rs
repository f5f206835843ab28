use chrono::{DateTime, Utc};
use pickup_core::conflict::format_conflict_message;
use pickup_core::protocol::{GameSummary, SignupSummary, UserSummary};
use pickup_core::{
    GameStatus, GameType, ScheduleError, Scheduled, ScheduledInterval, SignupStatus, SkillLevel,
    check_conflict,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use thiserror::Error;

/// Create all tables if they don't exist.
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            password_hash TEXT,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            starts_at INTEGER NOT NULL,
            duration INTEGER NOT NULL,
            location TEXT NOT NULL,
            max_players INTEGER NOT NULL,
            current_players INTEGER NOT NULL DEFAULT 0,
            price_per_player REAL NOT NULL DEFAULT 0,
            game_type TEXT NOT NULL,
            skill_level TEXT NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'OPEN',
            organizer_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (organizer_id) REFERENCES users(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS game_signups (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            game_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (user_id, game_id),
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (game_id) REFERENCES games(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS games_starts_at ON games (starts_at)")
        .execute(pool)
        .await?;

    Ok(())
}

// ── Users ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

fn user_from_row(r: &SqliteRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        id: r.get("id"),
        email: r.get("email"),
        name: r.get("name"),
        password_hash: r.get("password_hash"),
        created_at: timestamp(r.get("created_at"))?,
    })
}

/// Insert a new user. Fails with a unique violation if the email is taken.
pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    name: &str,
    password_hash: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO users (email, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert or rename a password-less demo user. Returns the local user id.
pub async fn upsert_demo_user(
    pool: &SqlitePool,
    email: &str,
    name: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (email, name, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(email) DO UPDATE SET name = ?2",
    )
    .bind(email)
    .bind(name)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT id FROM users WHERE email = ?1")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(row.get::<i64, _>("id"))
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn get_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

// ── Sessions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub user: UserSummary,
    pub expires_at: DateTime<Utc>,
}

/// Store a session token for the given user, valid until `expires_at`.
pub async fn create_session(
    pool: &SqlitePool,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(token)
        .bind(user_id)
        .bind(expires_at.timestamp())
        .execute(pool)
        .await?;

    Ok(())
}

/// Look up an unexpired session together with its user.
pub async fn get_session(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT u.id, u.name, u.email, s.expires_at FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > ?2",
    )
    .bind(token)
    .bind(Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(SessionRow {
            user: UserSummary {
                id: r.get("id"),
                name: r.get("name"),
                email: r.get("email"),
            },
            expires_at: timestamp(r.get("expires_at"))?,
        })
    })
    .transpose()
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions. Returns how many were deleted.
pub async fn delete_expired_sessions(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ── Games ───────────────────────────────────────────────────────────────

/// A stored game joined with its organizer.
#[derive(Debug, Clone)]
pub struct GameRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub duration: i64,
    pub location: String,
    pub max_players: i64,
    pub current_players: i64,
    pub price_per_player: f64,
    pub game_type: GameType,
    pub skill_level: SkillLevel,
    pub is_public: bool,
    pub status: GameStatus,
    pub organizer: UserSummary,
}

impl GameRow {
    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            starts_at: self.starts_at,
            duration: self.duration,
            location: self.location.clone(),
            max_players: self.max_players,
            current_players: self.current_players,
            price_per_player: self.price_per_player,
            game_type: self.game_type,
            skill_level: self.skill_level,
            is_public: self.is_public,
            status: self.status,
            organizer: self.organizer.clone(),
        }
    }
}

impl Scheduled for GameRow {
    fn interval(&self) -> ScheduledInterval {
        ScheduledInterval {
            start: self.starts_at,
            duration_minutes: self.duration,
        }
    }

    fn label(&self) -> &str {
        &self.title
    }
}

/// Fields of a game about to be inserted.
#[derive(Debug, Clone)]
pub struct NewGame<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub starts_at: DateTime<Utc>,
    pub duration: i64,
    pub location: &'a str,
    pub max_players: i64,
    pub price_per_player: f64,
    pub game_type: GameType,
    pub skill_level: SkillLevel,
    pub is_public: bool,
}

const GAME_SELECT: &str = "SELECT g.id, g.title, g.description, g.starts_at, g.duration,
        g.location, g.max_players, g.current_players, g.price_per_player, g.game_type,
        g.skill_level, g.is_public, g.status,
        u.id AS organizer_id, u.name AS organizer_name, u.email AS organizer_email
     FROM games g
     JOIN users u ON u.id = g.organizer_id";

fn game_from_row(r: &SqliteRow) -> Result<GameRow, sqlx::Error> {
    Ok(GameRow {
        id: r.get("id"),
        title: r.get("title"),
        description: r.get("description"),
        starts_at: timestamp(r.get("starts_at"))?,
        duration: r.get("duration"),
        location: r.get("location"),
        max_players: r.get("max_players"),
        current_players: r.get("current_players"),
        price_per_player: r.get("price_per_player"),
        game_type: decode(r.get::<String, _>("game_type"))?,
        skill_level: decode(r.get::<String, _>("skill_level"))?,
        is_public: r.get("is_public"),
        status: decode(r.get::<String, _>("status"))?,
        organizer: UserSummary {
            id: r.get("organizer_id"),
            name: r.get("organizer_name"),
            email: r.get("organizer_email"),
        },
    })
}

fn games_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<GameRow>, sqlx::Error> {
    rows.iter().map(game_from_row).collect()
}

/// Insert an `OPEN` game with no players. Returns its id.
pub async fn insert_game(
    pool: &SqlitePool,
    organizer_id: i64,
    game: &NewGame<'_>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO games (title, description, starts_at, duration, location, max_players,
            price_per_player, game_type, skill_level, is_public, status, organizer_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(game.title)
    .bind(game.description)
    .bind(game.starts_at.timestamp())
    .bind(game.duration)
    .bind(game.location)
    .bind(game.max_players)
    .bind(game.price_per_player)
    .bind(game.game_type.as_str())
    .bind(game.skill_level.as_str())
    .bind(game.is_public)
    .bind(GameStatus::Open.as_str())
    .bind(organizer_id)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_game(pool: &SqlitePool, id: i64) -> Result<Option<GameRow>, sqlx::Error> {
    let row = sqlx::query(&format!("{GAME_SELECT} WHERE g.id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(game_from_row).transpose()
}

/// Open games starting after `now`, soonest first.
pub async fn list_open_games(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<GameRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "{GAME_SELECT} WHERE g.status = ?1 AND g.starts_at >= ?2 ORDER BY g.starts_at ASC, g.id ASC"
    ))
    .bind(GameStatus::Open.as_str())
    .bind(now.timestamp())
    .fetch_all(pool)
    .await?;

    games_from_rows(rows)
}

/// Every game organized by the user, soonest first.
pub async fn games_organized_by(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<GameRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "{GAME_SELECT} WHERE g.organizer_id = ?1 ORDER BY g.starts_at ASC, g.id ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    games_from_rows(rows)
}

/// Games the user holds a signup for, optionally restricted to one status,
/// in signup order. Conflict candidates come from here, so the order is
/// the order conflicts are reported in.
pub async fn games_joined_by<'c, E>(
    executor: E,
    user_id: i64,
    status: Option<SignupStatus>,
) -> Result<Vec<GameRow>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "{GAME_SELECT}
         JOIN game_signups s ON s.game_id = g.id
         WHERE s.user_id = ?1 AND (?2 IS NULL OR s.status = ?2)
         ORDER BY s.created_at ASC, s.id ASC"
    ))
    .bind(user_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(executor)
    .await?;

    games_from_rows(rows)
}

/// Newest first, capped at `limit`.
pub async fn recent_games_joined_by(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<GameRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "{GAME_SELECT}
         JOIN game_signups s ON s.game_id = g.id
         WHERE s.user_id = ?1 AND s.status = ?2
         ORDER BY g.starts_at DESC, g.id DESC
         LIMIT ?3"
    ))
    .bind(user_id)
    .bind(SignupStatus::Confirmed.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    games_from_rows(rows)
}

/// Newest first, capped at `limit`.
pub async fn recent_games_organized_by(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<GameRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "{GAME_SELECT} WHERE g.organizer_id = ?1 ORDER BY g.starts_at DESC, g.id DESC LIMIT ?2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    games_from_rows(rows)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserCounts {
    pub games_played: u32,
    pub games_organized: u32,
    pub upcoming_games: u32,
}

pub async fn user_counts(
    pool: &SqlitePool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<UserCounts, sqlx::Error> {
    let row = sqlx::query(
        "SELECT
            (SELECT COUNT(*) FROM game_signups WHERE user_id = ?1 AND status = ?2) AS played,
            (SELECT COUNT(*) FROM games WHERE organizer_id = ?1) AS organized,
            (SELECT COUNT(*) FROM game_signups s JOIN games g ON g.id = s.game_id
               WHERE s.user_id = ?1 AND s.status = ?2 AND g.starts_at > ?3) AS upcoming",
    )
    .bind(user_id)
    .bind(SignupStatus::Confirmed.as_str())
    .bind(now.timestamp())
    .fetch_one(pool)
    .await?;

    Ok(UserCounts {
        games_played: row.get::<i64, _>("played") as u32,
        games_organized: row.get::<i64, _>("organized") as u32,
        upcoming_games: row.get::<i64, _>("upcoming") as u32,
    })
}

// ── Signups ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SignupRow {
    pub id: i64,
    pub user_id: i64,
    pub game_id: i64,
    pub status: SignupStatus,
    pub created_at: DateTime<Utc>,
}

impl SignupRow {
    pub fn summary(&self) -> SignupSummary {
        SignupSummary {
            id: self.id,
            game_id: self.game_id,
            user_id: self.user_id,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

fn signup_from_row(r: &SqliteRow) -> Result<SignupRow, sqlx::Error> {
    Ok(SignupRow {
        id: r.get("id"),
        user_id: r.get("user_id"),
        game_id: r.get("game_id"),
        status: decode(r.get::<String, _>("status"))?,
        created_at: timestamp(r.get("created_at"))?,
    })
}

pub async fn get_signup(
    pool: &SqlitePool,
    user_id: i64,
    game_id: i64,
) -> Result<Option<SignupRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, user_id, game_id, status, created_at FROM game_signups
         WHERE user_id = ?1 AND game_id = ?2",
    )
    .bind(user_id)
    .bind(game_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(signup_from_row).transpose()
}

#[derive(Debug, Clone)]
pub struct PlayerRow {
    pub user: UserSummary,
    pub status: SignupStatus,
    pub joined_at: DateTime<Utc>,
}

/// Players signed up for a game, in signup order.
pub async fn game_players(pool: &SqlitePool, game_id: i64) -> Result<Vec<PlayerRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT u.id, u.name, u.email, s.status, s.created_at FROM game_signups s
         JOIN users u ON u.id = s.user_id
         WHERE s.game_id = ?1
         ORDER BY s.created_at ASC, s.id ASC",
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(PlayerRow {
                user: UserSummary {
                    id: r.get("id"),
                    name: r.get("name"),
                    email: r.get("email"),
                },
                status: decode(r.get::<String, _>("status"))?,
                joined_at: timestamp(r.get("created_at"))?,
            })
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("game is full")]
    Full,
    #[error("already signed up")]
    AlreadyJoined,
    #[error("{message}")]
    Conflict { conflicting_game_id: i64, message: String },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Take a seat, check the user's schedule and record a confirmed signup in
/// one transaction.
///
/// The seat update is the first statement, so the transaction holds SQLite's
/// write lock before the user's confirmed games are read; concurrent joins
/// are checked one after another against committed signups. The seat counter
/// only moves while below `max_players` and the signup row is unique per
/// (user, game), so joins can neither overfill a game, double-book it, nor
/// land inside the buffer of another confirmed game.
pub async fn join_game(
    pool: &SqlitePool,
    user_id: i64,
    game: &GameRow,
) -> Result<SignupRow, JoinError> {
    let mut tx = pool.begin().await?;

    let seat = sqlx::query(
        "UPDATE games SET current_players = current_players + 1
         WHERE id = ?1 AND current_players < max_players",
    )
    .bind(game.id)
    .execute(&mut *tx)
    .await?;

    if seat.rows_affected() == 0 {
        return Err(JoinError::Full);
    }

    let confirmed = games_joined_by(&mut *tx, user_id, Some(SignupStatus::Confirmed)).await?;
    let others: Vec<&GameRow> = confirmed.iter().filter(|other| other.id != game.id).collect();
    let conflict = check_conflict(&game.interval(), &others)?;
    if let Some(other) = conflict.conflicting_game {
        return Err(JoinError::Conflict {
            conflicting_game_id: other.id,
            message: format_conflict_message(&conflict),
        });
    }

    let created_at = Utc::now();
    let inserted = sqlx::query(
        "INSERT INTO game_signups (user_id, game_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(user_id)
    .bind(game.id)
    .bind(SignupStatus::Confirmed.as_str())
    .bind(created_at.timestamp())
    .execute(&mut *tx)
    .await;

    let signup_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(JoinError::AlreadyJoined),
        Err(err) => return Err(err.into()),
    };

    tx.commit().await?;

    Ok(SignupRow {
        id: signup_id,
        user_id,
        game_id: game.id,
        status: SignupStatus::Confirmed,
        created_at: timestamp(created_at.timestamp())?,
    })
}

/// Remove a signup and release its seat in one transaction.
pub async fn leave_game(pool: &SqlitePool, signup_id: i64, game_id: i64) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM game_signups WHERE id = ?1")
        .bind(signup_id)
        .execute(&mut *tx)
        .await?;

    if deleted.rows_affected() > 0 {
        sqlx::query(
            "UPDATE games SET current_players = MAX(current_players - 1, 0) WHERE id = ?1",
        )
        .bind(game_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {secs}").into()))
}

fn decode<T: std::str::FromStr>(value: String) -> Result<T, sqlx::Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|err: T::Err| sqlx::Error::Decode(Box::new(err)))
}
