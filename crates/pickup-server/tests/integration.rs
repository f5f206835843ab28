use std::time::Duration;

use chrono::Utc;
use pickup_core::protocol::{
    AuthResponse, ConflictInfo, Dashboard, GameDetail, GameListing, GameSummary, SplitGames,
    UserProfile,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use pickup_server::config::ServerConfig;

/// Spin up a test server on a random port, return the base URL.
async fn start_server_with(config: ServerConfig) -> String {
    let (app, _state) = pickup_server::build_app(config).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{}", port)
}

async fn start_server() -> String {
    // In-memory SQLite so tests don't clash.
    start_server_with(ServerConfig::in_memory()).await
}

/// Sign in a demo user, return (token, user id).
async fn demo_auth(base: &str, name: &str) -> (String, i64) {
    let resp: AuthResponse = reqwest::Client::new()
        .post(format!("{}/auth/demo", base))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    (resp.token, resp.user.id)
}

/// A date a few days out, as the form sends it.
fn future_day(days: i64) -> String {
    (Utc::now() + chrono::Duration::days(days))
        .date_naive()
        .format("%Y-%m-%d")
        .to_string()
}

fn game_body(title: &str, day: &str, time: &str, duration: i64) -> Value {
    json!({
        "title": title,
        "date": day,
        "time": time,
        "duration": duration,
        "location": "Riverside courts",
        "max_players": 10,
        "game_type": "PICKUP",
        "skill_level": "INTERMEDIATE",
    })
}

async fn create_game(base: &str, token: &str, body: Value) -> GameSummary {
    let resp = reqwest::Client::new()
        .post(format!("{}/games", base))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

async fn post(base: &str, path: &str, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

async fn get_json<T: serde::de::DeserializeOwned>(base: &str, path: &str, token: Option<&str>) -> T {
    let mut req = reqwest::Client::new().get(format!("{}{}", base, path));
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "GET {}", path);
    resp.json().await.unwrap()
}

async fn error_of(resp: reqwest::Response) -> (StatusCode, String) {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let base = start_server().await;
    let resp = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(resp, "ok");
}

#[tokio::test]
async fn test_register_login_and_logout() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "Casey@Example.com", "password": "pickup123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let registered: AuthResponse = resp.json().await.unwrap();
    assert_eq!(registered.user.email, "casey@example.com");
    assert_eq!(registered.user.name, "casey");

    let dup = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "casey@example.com", "password": "another1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(error_of(dup).await, (StatusCode::CONFLICT, "User already exists".into()));

    let bad = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "casey@example.com", "password": "wrong-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

    let login: AuthResponse = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "casey@example.com", "password": "pickup123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(login.user.id, registered.user.id);
    assert_ne!(login.token, registered.token);

    let out = post(&base, "/auth/logout", &login.token).await;
    assert_eq!(out.status(), StatusCode::NO_CONTENT);

    let after = client
        .get(format!("{}/dashboard", base))
        .bearer_auth(&login.token)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demo_login_reuses_user() {
    let base = start_server().await;
    let (t1, id1) = demo_auth(&base, "Jamie Lee").await;
    let (t2, id2) = demo_auth(&base, "Jamie Lee").await;
    assert_eq!(id1, id2);
    assert_ne!(t1, t2);
}

#[tokio::test]
async fn test_demo_login_can_be_disabled() {
    let base = start_server_with(ServerConfig {
        demo_login: false,
        ..ServerConfig::in_memory()
    })
    .await;
    let resp = reqwest::Client::new()
        .post(format!("{}/auth/demo", base))
        .json(&json!({ "name": "Jamie" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_game_requires_auth_and_valid_form() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let day = future_day(3);

    let anon = client
        .post(format!("{}/games", base))
        .json(&game_body("Hoops", &day, "18:00", 60))
        .send()
        .await
        .unwrap();
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);

    let (token, organizer_id) = demo_auth(&base, "organizer").await;

    let short = client
        .post(format!("{}/games", base))
        .bearer_auth(&token)
        .json(&game_body("Hoops", &day, "18:00", 10))
        .send()
        .await
        .unwrap();
    let (status, message) = error_of(short).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("Duration"), "{}", message);

    let past = client
        .post(format!("{}/games", base))
        .bearer_auth(&token)
        .json(&game_body("Hoops", &future_day(-2), "18:00", 60))
        .send()
        .await
        .unwrap();
    assert_eq!(
        error_of(past).await,
        (StatusCode::BAD_REQUEST, "Game date must be in the future".into())
    );

    let game = create_game(&base, &token, game_body("  Hoops  ", &day, "18:00", 60)).await;
    assert_eq!(game.title, "Hoops");
    assert_eq!(game.current_players, 0);
    assert_eq!(game.organizer.id, organizer_id);
    assert_eq!(game.starts_at.format("%H:%M").to_string(), "18:00");
}

#[tokio::test]
async fn test_join_and_leave_update_player_count() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;
    let (player, player_id) = demo_auth(&base, "player").await;
    let game = create_game(&base, &organizer, game_body("Hoops", &future_day(3), "18:00", 60)).await;

    let join = post(&base, &format!("/games/{}/join", game.id), &player).await;
    assert_eq!(join.status(), StatusCode::OK);
    let joined: Value = join.json().await.unwrap();
    assert_eq!(joined["success"], true);
    assert_eq!(joined["signup"]["status"], "CONFIRMED");

    let detail: GameDetail = get_json(&base, &format!("/games/{}", game.id), Some(&player)).await;
    assert_eq!(detail.game.current_players, 1);
    assert!(detail.joined);
    assert_eq!(detail.players.len(), 1);
    assert_eq!(detail.players[0].user.id, player_id);

    let again = post(&base, &format!("/games/{}/join", game.id), &player).await;
    assert_eq!(
        error_of(again).await,
        (StatusCode::BAD_REQUEST, "You have already joined this game".into())
    );

    let leave = post(&base, &format!("/games/{}/leave", game.id), &player).await;
    assert_eq!(leave.status(), StatusCode::OK);

    let detail: GameDetail = get_json(&base, &format!("/games/{}", game.id), None).await;
    assert_eq!(detail.game.current_players, 0);
    assert!(detail.players.is_empty());

    let twice = post(&base, &format!("/games/{}/leave", game.id), &player).await;
    assert_eq!(
        error_of(twice).await,
        (StatusCode::BAD_REQUEST, "You are not signed up for this game".into())
    );
}

#[tokio::test]
async fn test_join_missing_game_is_404() {
    let base = start_server().await;
    let (token, _) = demo_auth(&base, "player").await;
    let resp = post(&base, "/games/9999/join", &token).await;
    assert_eq!(error_of(resp).await, (StatusCode::NOT_FOUND, "Game not found".into()));
}

#[tokio::test]
async fn test_full_game_rejects_join() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;
    let mut body = game_body("Doubles", &future_day(3), "09:00", 60);
    body["max_players"] = json!(2);
    let game = create_game(&base, &organizer, body).await;

    for name in ["p1", "p2"] {
        let (token, _) = demo_auth(&base, name).await;
        let resp = post(&base, &format!("/games/{}/join", game.id), &token).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let (late, _) = demo_auth(&base, "p3").await;
    let resp = post(&base, &format!("/games/{}/join", game.id), &late).await;
    assert_eq!(error_of(resp).await, (StatusCode::BAD_REQUEST, "Game is full".into()));
}

#[tokio::test]
async fn test_join_blocked_by_schedule_conflict() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;
    let (player, _) = demo_auth(&base, "player").await;
    let day = future_day(4);

    let morning = create_game(&base, &organizer, game_body("Morning match", &day, "10:00", 60)).await;
    let back_to_back = create_game(&base, &organizer, game_body("Quick rally", &day, "11:00", 30)).await;
    let after_buffer = create_game(&base, &organizer, game_body("Late session", &day, "11:30", 60)).await;

    let resp = post(&base, &format!("/games/{}/join", morning.id), &player).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Pre-check agrees with the join gate.
    let check: ConflictInfo = get_json(
        &base,
        &format!("/games/{}/conflict", back_to_back.id),
        Some(&player),
    )
    .await;
    assert!(check.has_conflict);
    assert_eq!(check.conflicting_title.as_deref(), Some("Morning match"));
    assert_eq!(check.conflicting_starts_at, Some(morning.starts_at));
    assert_eq!(check.clashes.len(), 1);
    assert_eq!(check.clashes[0].title, "Morning match");

    let resp = post(&base, &format!("/games/{}/join", back_to_back.id), &player).await;
    let (status, message) = error_of(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.starts_with("Time conflict with \"Morning match\""), "{}", message);
    assert!(message.ends_with("Games must have at least 30 minutes between them."));

    // Exactly 30 minutes after the first game ends is fine.
    let resp = post(&base, &format!("/games/{}/join", after_buffer.id), &player).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let detail: GameDetail =
        get_json(&base, &format!("/games/{}", back_to_back.id), None).await;
    assert_eq!(detail.game.current_players, 0);
}

#[tokio::test]
async fn test_conflict_check_lists_every_clash() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;
    let (player, _) = demo_auth(&base, "player").await;
    let day = future_day(6);

    let morning = create_game(&base, &organizer, game_body("Morning", &day, "10:00", 60)).await;
    let noon = create_game(&base, &organizer, game_body("Noon", &day, "12:00", 60)).await;
    let between = create_game(&base, &organizer, game_body("Between", &day, "11:15", 30)).await;

    for game in [&morning, &noon] {
        let resp = post(&base, &format!("/games/{}/join", game.id), &player).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let check: ConflictInfo =
        get_json(&base, &format!("/games/{}/conflict", between.id), Some(&player)).await;
    assert!(check.has_conflict);
    assert_eq!(check.conflicting_title.as_deref(), Some("Morning"));
    let titles: Vec<&str> = check.clashes.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Morning", "Noon"]);
    assert_eq!(check.clashes[1].starts_at, noon.starts_at);
}

#[tokio::test]
async fn test_concurrent_overlapping_joins_admit_one() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;

    for round in 0..10i64 {
        let (player, _) = demo_auth(&base, &format!("racer {round}")).await;
        let day = future_day(2 + round);
        let early = create_game(&base, &organizer, game_body("Early", &day, "10:00", 60)).await;
        let overlap = create_game(&base, &organizer, game_body("Overlap", &day, "10:15", 60)).await;

        let join_early = format!("/games/{}/join", early.id);
        let join_overlap = format!("/games/{}/join", overlap.id);
        let (a, b) = tokio::join!(
            post(&base, &join_early, &player),
            post(&base, &join_overlap, &player)
        );

        let mut statuses = vec![a.status(), b.status()];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::BAD_REQUEST],
            "round {round}"
        );

        let joined: SplitGames = get_json(&base, "/dashboard/joined", Some(&player)).await;
        assert_eq!(joined.upcoming.len(), 1, "round {round}");
    }
}

#[tokio::test]
async fn test_listing_annotates_conflicts_for_signed_in_user() {
    let base = start_server().await;
    let (organizer, _) = demo_auth(&base, "organizer").await;
    let (player, _) = demo_auth(&base, "player").await;
    let day = future_day(5);

    let later = create_game(&base, &organizer, game_body("Evening", &day, "19:00", 90)).await;
    let first = create_game(&base, &organizer, game_body("Lunch", &day, "12:00", 60)).await;
    let overlapping = create_game(&base, &organizer, game_body("Overlap", &day, "12:30", 60)).await;

    post(&base, &format!("/games/{}/join", first.id), &player).await;

    let anon: Vec<GameListing> = get_json(&base, "/games", None).await;
    let ids: Vec<i64> = anon.iter().map(|l| l.game.id).collect();
    assert_eq!(ids, vec![first.id, overlapping.id, later.id]);
    assert!(anon.iter().all(|l| !l.joined && l.conflict.is_none()));

    let mine: Vec<GameListing> = get_json(&base, "/games", Some(&player)).await;
    let lunch = mine.iter().find(|l| l.game.id == first.id).unwrap();
    assert!(lunch.joined);
    assert!(lunch.conflict.is_none());

    let clash = mine.iter().find(|l| l.game.id == overlapping.id).unwrap();
    assert!(clash.conflict.as_ref().unwrap().has_conflict);

    let evening = mine.iter().find(|l| l.game.id == later.id).unwrap();
    assert!(!evening.conflict.as_ref().unwrap().has_conflict);
}

#[tokio::test]
async fn test_dashboard_splits_organized_and_joined() {
    let base = start_server().await;
    let (organizer, organizer_id) = demo_auth(&base, "organizer").await;
    let (player, _) = demo_auth(&base, "player").await;

    let a = create_game(&base, &organizer, game_body("A", &future_day(2), "08:00", 60)).await;
    let b = create_game(&base, &organizer, game_body("B", &future_day(1), "08:00", 60)).await;
    post(&base, &format!("/games/{}/join", a.id), &player).await;
    post(&base, &format!("/games/{}/join", b.id), &organizer).await;

    let dash: Dashboard = get_json(&base, "/dashboard", Some(&organizer)).await;
    assert_eq!(dash.user.id, organizer_id);
    assert_eq!(dash.organized_count, 2);
    assert_eq!(dash.joined_count, 1);
    let organized: Vec<i64> = dash.upcoming_organized.iter().map(|g| g.id).collect();
    assert_eq!(organized, vec![b.id, a.id]);

    let joined: SplitGames = get_json(&base, "/dashboard/joined", Some(&player)).await;
    assert_eq!(joined.upcoming.len(), 1);
    assert_eq!(joined.upcoming[0].id, a.id);
    assert!(joined.past.is_empty());

    let organized: SplitGames = get_json(&base, "/dashboard/organized", Some(&player)).await;
    assert!(organized.upcoming.is_empty() && organized.past.is_empty());
}

#[tokio::test]
async fn test_public_profile() {
    let base = start_server().await;
    let (organizer, organizer_id) = demo_auth(&base, "organizer").await;
    create_game(&base, &organizer, game_body("A", &future_day(2), "08:00", 60)).await;
    let b = create_game(&base, &organizer, game_body("B", &future_day(3), "08:00", 60)).await;
    post(&base, &format!("/games/{}/join", b.id), &organizer).await;

    let profile: UserProfile = get_json(&base, &format!("/users/{}", organizer_id), None).await;
    assert_eq!(profile.user.name, "organizer");
    assert_eq!(profile.stats.games_organized, 2);
    assert_eq!(profile.stats.games_played, 1);
    assert_eq!(profile.stats.upcoming_games, 1);
    assert_eq!(profile.organized_games[0].id, b.id);

    let missing = reqwest::get(format!("{}/users/4242", base)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
