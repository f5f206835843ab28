use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use pickup_core::conflict::find_all_conflicts;
use pickup_core::protocol::{
    AuthResponse, Clash, ConflictInfo, CreateGameRequest, Dashboard, DemoLoginRequest, GameDetail,
    GameListing, GameSummary, JoinResponse, LeaveResponse, LoginRequest, PlayerEntry,
    ProfileStats, PublicUser, RegisterRequest, SplitGames, UserProfile, UserSummary,
};
use pickup_core::{GameStatus, Scheduled, SignupStatus, check_conflict};

use crate::auth::{self, AuthUser, MaybeAuthUser};
use crate::db::{self, GameRow, JoinError, NewGame};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const RECENT_GAMES_LIMIT: i64 = 10;
const RECENT_ORGANIZED_LIMIT: i64 = 5;

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ── Auth ────────────────────────────────────────────────────────────────

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    if db::get_user_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| auth::default_name(&email));
    let password_hash = auth::hash_password(&req.password)?;

    let user_id = match db::create_user(&state.db, &email, &name, Some(&password_hash)).await {
        Ok(id) => id,
        Err(err) if db::is_unique_violation(&err) => {
            return Err(AppError::Conflict("User already exists".into()));
        }
        Err(err) => return Err(err.into()),
    };

    let user = UserSummary {
        id: user_id,
        name,
        email,
    };
    let token = auth::issue_session(&state, user.clone()).await?;
    info!(user_id, "registered user");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    let user = db::get_user_by_email(&state.db, &email)
        .await?
        .filter(|user| {
            user.password_hash
                .as_deref()
                .is_some_and(|stored| auth::verify_password(&req.password, stored))
        })
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    let token = auth::issue_session(&state, user.summary()).await?;
    Ok(Json(AuthResponse {
        token,
        user: user.summary(),
    }))
}

pub async fn demo_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DemoLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if !state.config.demo_login {
        return Err(AppError::NotFound("Demo sign-in is disabled".into()));
    }
    req.validate()?;

    let name = req.name.trim().to_string();
    let email = auth::demo_email(&name);
    let user_id = db::upsert_demo_user(&state.db, &email, &name).await?;
    let user = UserSummary {
        id: user_id,
        name,
        email,
    };
    let token = auth::issue_session(&state, user.clone()).await?;
    info!(user_id, "[demo] authenticated user");

    Ok(Json(AuthResponse { token, user }))
}

pub async fn logout(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<StatusCode> {
    auth::revoke_session(&state, &user.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Conflicts ───────────────────────────────────────────────────────────

/// The user's confirmed games, in signup order.
async fn confirmed_games(state: &AppState, user_id: i64) -> AppResult<Vec<GameRow>> {
    Ok(db::games_joined_by(&state.db, user_id, Some(SignupStatus::Confirmed)).await?)
}

/// Pre-check shown next to a game. The game itself is never its own conflict.
fn conflict_for(game: &GameRow, confirmed: &[GameRow]) -> AppResult<ConflictInfo> {
    let others: Vec<&GameRow> = confirmed.iter().filter(|other| other.id != game.id).collect();
    let target = game.interval();
    let result = check_conflict(&target, &others)?;
    let clashes = find_all_conflicts(&target, &others)?;
    Ok(ConflictInfo {
        clashes: clashes.into_iter().map(Clash::of).collect(),
        ..ConflictInfo::from(&result)
    })
}

// ── Games ───────────────────────────────────────────────────────────────

pub async fn list_games(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
) -> AppResult<Json<Vec<GameListing>>> {
    let games = db::list_open_games(&state.db, Utc::now()).await?;

    let confirmed = match &user {
        Some(user) => confirmed_games(&state, user.id).await?,
        None => Vec::new(),
    };
    let joined: HashSet<i64> = confirmed.iter().map(|g| g.id).collect();

    let listings = games
        .iter()
        .map(|game| {
            let is_joined = joined.contains(&game.id);
            let conflict = match &user {
                Some(_) if !is_joined => Some(conflict_for(game, &confirmed)?),
                _ => None,
            };
            Ok(GameListing {
                game: game.summary(),
                joined: is_joined,
                conflict,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(listings))
}

pub async fn create_game(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateGameRequest>,
) -> AppResult<(StatusCode, Json<GameSummary>)> {
    req.validate()?;
    let starts_at = req
        .starts_at()
        .ok_or_else(|| AppError::BadRequest("Time must be HH:MM".into()))?;
    if starts_at <= Utc::now() {
        return Err(AppError::BadRequest("Game date must be in the future".into()));
    }

    let new_game = NewGame {
        title: req.title.trim(),
        description: req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty()),
        starts_at,
        duration: req.duration,
        location: req.location.trim(),
        max_players: req.max_players,
        price_per_player: req.price_per_player,
        game_type: req.game_type,
        skill_level: req.skill_level,
        is_public: req.is_public,
    };
    let game_id = db::insert_game(&state.db, user.id, &new_game).await?;
    let game = db::get_game(&state.db, game_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("game {game_id} vanished after insert")))?;

    info!(game_id, organizer_id = user.id, starts_at = %game.starts_at, "created game");
    Ok((StatusCode::CREATED, Json(game.summary())))
}

async fn find_game(state: &AppState, id: i64) -> AppResult<GameRow> {
    db::get_game(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Game not found".into()))
}

pub async fn get_game(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<GameDetail>> {
    let game = find_game(&state, id).await?;
    let players = db::game_players(&state.db, id)
        .await?
        .into_iter()
        .map(|p| PlayerEntry {
            user: p.user,
            status: p.status,
            joined_at: p.joined_at,
        })
        .collect::<Vec<_>>();

    let (joined, conflict) = match &user {
        Some(user) => {
            let joined = players.iter().any(|p| p.user.id == user.id);
            let conflict = if joined {
                None
            } else {
                let confirmed = confirmed_games(&state, user.id).await?;
                Some(conflict_for(&game, &confirmed)?)
            };
            (joined, conflict)
        }
        None => (false, None),
    };

    Ok(Json(GameDetail {
        game: game.summary(),
        players,
        joined,
        conflict,
    }))
}

/// Join-form pre-check: would joining this game clash with the caller's games?
pub async fn check_game_conflict(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ConflictInfo>> {
    let game = find_game(&state, id).await?;
    let confirmed = confirmed_games(&state, user.id).await?;
    Ok(Json(conflict_for(&game, &confirmed)?))
}

pub async fn join_game(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<JoinResponse>> {
    let game = find_game(&state, id).await?;

    if game.status != GameStatus::Open {
        return Err(AppError::BadRequest("Game is not available for joining".into()));
    }
    if game.is_full() {
        return Err(AppError::BadRequest("Game is full".into()));
    }
    if db::get_signup(&state.db, user.id, id).await?.is_some() {
        return Err(AppError::BadRequest("You have already joined this game".into()));
    }

    // The schedule check runs inside the signup transaction.
    let signup = match db::join_game(&state.db, user.id, &game).await {
        Ok(signup) => signup,
        Err(JoinError::Full) => return Err(AppError::BadRequest("Game is full".into())),
        Err(JoinError::AlreadyJoined) => {
            return Err(AppError::BadRequest("You have already joined this game".into()));
        }
        Err(JoinError::Conflict {
            conflicting_game_id,
            message,
        }) => {
            warn!(
                user_id = user.id,
                game_id = id,
                conflicting_game_id,
                "join rejected: schedule conflict"
            );
            return Err(AppError::BadRequest(message));
        }
        Err(JoinError::Schedule(err)) => return Err(err.into()),
        Err(JoinError::Database(err)) => return Err(err.into()),
    };

    info!(user_id = user.id, game_id = id, "player joined game");
    Ok(Json(JoinResponse {
        success: true,
        message: "Successfully joined the game".into(),
        signup: signup.summary(),
    }))
}

pub async fn leave_game(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LeaveResponse>> {
    find_game(&state, id).await?;

    let signup = db::get_signup(&state.db, user.id, id)
        .await?
        .ok_or_else(|| AppError::BadRequest("You are not signed up for this game".into()))?;

    db::leave_game(&state.db, signup.id, id).await?;

    info!(user_id = user.id, game_id = id, "player left game");
    Ok(Json(LeaveResponse {
        success: true,
        message: "Successfully left the game".into(),
    }))
}

// ── Dashboard ───────────────────────────────────────────────────────────

fn summaries(games: &[GameRow]) -> Vec<GameSummary> {
    games.iter().map(GameRow::summary).collect()
}

/// Every game the user signed up for, by start time.
async fn joined_games(state: &AppState, user_id: i64) -> AppResult<Vec<GameRow>> {
    let mut games = db::games_joined_by(&state.db, user_id, None).await?;
    games.sort_by_key(|g| (g.starts_at, g.id));
    Ok(games)
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Dashboard>> {
    let profile = db::get_user(&state.db, user.id)
        .await?
        .map(|row| row.summary())
        .unwrap_or_else(|| user.summary());
    let organized = db::games_organized_by(&state.db, user.id).await?;
    let joined = joined_games(&state, user.id).await?;

    let now = Utc::now();
    Ok(Json(Dashboard {
        user: profile,
        upcoming_organized: SplitGames::split(summaries(&organized), now).upcoming,
        upcoming_joined: SplitGames::split(summaries(&joined), now).upcoming,
        organized_count: organized.len() as u32,
        joined_count: joined.len() as u32,
    }))
}

pub async fn dashboard_organized(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<SplitGames>> {
    let organized = db::games_organized_by(&state.db, user.id).await?;
    Ok(Json(SplitGames::split(summaries(&organized), Utc::now())))
}

pub async fn dashboard_joined(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<SplitGames>> {
    let joined = joined_games(&state, user.id).await?;
    Ok(Json(SplitGames::split(summaries(&joined), Utc::now())))
}

// ── Profile ─────────────────────────────────────────────────────────────

pub async fn profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserProfile>> {
    let user = db::get_user(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let recent = db::recent_games_joined_by(&state.db, id, RECENT_GAMES_LIMIT).await?;
    let organized = db::recent_games_organized_by(&state.db, id, RECENT_ORGANIZED_LIMIT).await?;
    let counts = db::user_counts(&state.db, id, Utc::now()).await?;

    Ok(Json(UserProfile {
        user: PublicUser {
            id: user.id,
            name: user.name,
            member_since: user.created_at,
        },
        recent_games: summaries(&recent),
        organized_games: summaries(&organized),
        stats: ProfileStats {
            games_played: counts.games_played,
            games_organized: counts.games_organized,
            upcoming_games: counts.upcoming_games,
        },
    }))
}
