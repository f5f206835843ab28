use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::conflict::ConflictResult;
use crate::game::{
    DEFAULT_GAME_DURATION, DEFAULT_MAX_PLAYERS, GameStatus, GameType, MAX_GAME_DURATION,
    MAX_PLAYERS, MIN_GAME_DURATION, MIN_PLAYERS, SignupStatus, SkillLevel,
};
use crate::schedule::{Scheduled, ScheduledInterval};

/// The signed-in user as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DemoLoginRequest {
    #[validate(length(min = 1, max = 50), custom(function = "not_blank"))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

/// Form payload for organizing a new game.
///
/// `date` and `time` are combined into a UTC instant; see [`CreateGameRequest::starts_at`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateGameRequest {
    #[validate(
        length(max = 100, message = "Title is too long"),
        custom(function = "not_blank", message = "Title is required")
    )]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub date: NaiveDate,
    /// `HH:MM` or `HH:MM:SS`.
    #[validate(custom(function = "clock_time"))]
    pub time: String,
    #[serde(default = "default_duration")]
    #[validate(range(
        min = MIN_GAME_DURATION,
        max = MAX_GAME_DURATION,
        message = "Duration must be between 30 and 240 minutes"
    ))]
    pub duration: i64,
    #[validate(
        length(max = 200),
        custom(function = "not_blank", message = "Location is required")
    )]
    pub location: String,
    #[serde(default = "default_max_players")]
    #[validate(range(
        min = MIN_PLAYERS,
        max = MAX_PLAYERS,
        message = "Games take between 2 and 50 players"
    ))]
    pub max_players: i64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price_per_player: f64,
    #[serde(default)]
    pub game_type: GameType,
    #[serde(default)]
    pub skill_level: SkillLevel,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

impl CreateGameRequest {
    /// Start instant, or `None` when `time` is not a valid clock time.
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        parse_clock_time(&self.time).map(|time| self.date.and_time(time).and_utc())
    }
}

fn default_duration() -> i64 {
    DEFAULT_GAME_DURATION
}

fn default_max_players() -> i64 {
    DEFAULT_MAX_PLAYERS
}

fn default_public() -> bool {
    true
}

fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn clock_time(value: &str) -> Result<(), ValidationError> {
    if parse_clock_time(value).is_none() {
        let mut err = ValidationError::new("clock_time");
        err.message = Some(format!("Time must be HH:MM (got {value:?})").into());
        return Err(err);
    }
    Ok(())
}

/// A game as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
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

impl GameSummary {
    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }
}

impl Scheduled for GameSummary {
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

/// A confirmed game that falls inside another game's buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clash {
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub duration: i64,
}

impl Clash {
    pub fn of<T: Scheduled>(game: &T) -> Self {
        let interval = game.interval();
        Clash {
            title: game.label().to_string(),
            starts_at: interval.start,
            duration: interval.duration_minutes,
        }
    }
}

/// Serializable view of a [`ConflictResult`].
///
/// `clashes` lists every conflicting game, not just the first one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub has_conflict: bool,
    pub conflicting_title: Option<String>,
    pub conflicting_starts_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    #[serde(default)]
    pub clashes: Vec<Clash>,
}

impl<T: Scheduled> From<&ConflictResult<'_, T>> for ConflictInfo {
    fn from(result: &ConflictResult<'_, T>) -> Self {
        ConflictInfo {
            has_conflict: result.has_conflict,
            conflicting_title: result.conflicting_game.map(|g| g.label().to_string()),
            conflicting_starts_at: result.conflicting_game.map(|g| g.interval().start),
            message: result.message.clone(),
            clashes: result.conflicting_game.map(Clash::of).into_iter().collect(),
        }
    }
}

/// A game in the public listing, annotated for the caller when signed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListing {
    #[serde(flatten)]
    pub game: GameSummary,
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub conflict: Option<ConflictInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub user: UserSummary,
    pub status: SignupStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDetail {
    #[serde(flatten)]
    pub game: GameSummary,
    pub players: Vec<PlayerEntry>,
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub conflict: Option<ConflictInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupSummary {
    pub id: i64,
    pub game_id: i64,
    pub user_id: i64,
    pub status: SignupStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub success: bool,
    pub message: String,
    pub signup: SignupSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub success: bool,
    pub message: String,
}

/// Games split around the current time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitGames {
    pub upcoming: Vec<GameSummary>,
    pub past: Vec<GameSummary>,
}

impl SplitGames {
    pub fn split(games: Vec<GameSummary>, now: DateTime<Utc>) -> Self {
        let (upcoming, past): (Vec<_>, Vec<_>) =
            games.into_iter().partition(|g| g.starts_at > now);
        SplitGames { upcoming, past }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub user: UserSummary,
    pub upcoming_organized: Vec<GameSummary>,
    pub upcoming_joined: Vec<GameSummary>,
    pub organized_count: u32,
    pub joined_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub member_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStats {
    pub games_played: u32,
    pub games_organized: u32,
    pub upcoming_games: u32,
}

/// Public profile page data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: PublicUser,
    pub recent_games: Vec<GameSummary>,
    pub organized_games: Vec<GameSummary>,
    pub stats: ProfileStats,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
