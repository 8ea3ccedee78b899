//! End-to-end tests over the HTTP and WebSocket surfaces.
//!
//! Spin up the real router on an ephemeral port, drive it with reqwest and
//! a WebSocket client, and watch a small session play out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use quiz_host::api::routes;
use quiz_host::api::server::AppState;
use quiz_host::clock::SystemClock;
use quiz_host::config::Settings;
use quiz_host::database::repositories::{
    SqlxAnswerRepository, SqlxPlayerRepository, SqlxQuizRepository, SqlxSessionRepository,
    SqlxSnapshotRepository,
};
use quiz_host::database::{init_pool, run_migrations};
use quiz_host::grader::OpenAiGrader;
use quiz_host::runtime::RuntimeController;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

async fn spawn_server() -> TestServer {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}/api.db?mode=rwc", dir.path().display());
    let pool = init_pool(&url).await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    let mut settings = Settings::default();
    settings.media_root = dir.path().join("media");
    let settings = Arc::new(settings);

    let quiz_repository = Arc::new(SqlxQuizRepository::new(pool.clone()));
    let session_repository = Arc::new(SqlxSessionRepository::new(pool.clone()));
    let player_repository = Arc::new(SqlxPlayerRepository::new(pool.clone()));
    let answer_repository = Arc::new(SqlxAnswerRepository::new(pool.clone()));
    let snapshot_repository = Arc::new(SqlxSnapshotRepository::new(pool.clone()));

    let controller = Arc::new(RuntimeController::new(
        Arc::new(SystemClock),
        Arc::new(OpenAiGrader::new(
            None,
            "gpt-3.5-turbo",
            Duration::from_secs(1),
        )),
        session_repository.clone(),
        quiz_repository.clone(),
        player_repository.clone(),
        answer_repository.clone(),
        snapshot_repository.clone(),
    ));

    let state = AppState::new(
        settings,
        controller,
        quiz_repository,
        session_repository,
        player_repository,
        answer_repository,
        snapshot_repository,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Missing local addr");
    let router = routes::create_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestServer {
        addr,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

/// Create a quiz with one multiple-choice question and a session playing it.
/// Returns (quiz_id, session_id).
async fn seed_game(server: &TestServer) -> (String, String) {
    let quiz: Value = server
        .client
        .post(server.url("/admin/quizzes"))
        .json(&json!({
            "name": "Warmup",
            "gap_seconds": 0,
            "questions": [{
                "text": "Pick A",
                "answer_type": "multiple_choice",
                "options": ["A", "B"],
                "correct_answer": "A",
                "duration_seconds": 30
            }]
        }))
        .send()
        .await
        .expect("create quiz")
        .json()
        .await
        .expect("quiz json");
    let quiz_id = quiz["id"].as_str().expect("quiz id").to_string();

    let session: Value = server
        .client
        .post(server.url("/admin/sessions"))
        .json(&json!({ "name": "Round one", "quiz_ids": [quiz_id] }))
        .send()
        .await
        .expect("create session")
        .json()
        .await
        .expect("session json");
    let session_id = session["id"].as_str().expect("session id").to_string();

    (quiz_id, session_id)
}

/// Read frames until a state payload satisfies the predicate.
async fn wait_for_state<S, F>(socket: &mut S, timeout: Duration, pred: F) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    F: Fn(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("state deadline passed");
        let frame = tokio::time::timeout(remaining, socket.next())
            .await
            .expect("frame within deadline")
            .expect("socket open")
            .expect("frame ok");
        if let Message::Text(text) = frame
            && let Ok(value) = serde_json::from_str::<Value>(&text)
            && value["type"] == "state"
            && pred(&value["state"])
        {
            return value["state"].clone();
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = spawn_server().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("health request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("health json");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_quiz_crud_over_http() {
    let server = spawn_server().await;
    let (quiz_id, _session_id) = seed_game(&server).await;

    // Unknown quiz is a 404.
    let response = server
        .client
        .get(server.url("/admin/quizzes/missing"))
        .send()
        .await
        .expect("get quiz");
    assert_eq!(response.status(), 404);

    // Append a second question; positions stay dense.
    let response = server
        .client
        .post(server.url(&format!("/admin/quizzes/{quiz_id}/questions")))
        .json(&json!({
            "text": "Closest to 100",
            "answer_type": "numeric",
            "options": [],
            "correct_answer": "100",
            "scoring_type": "closest"
        }))
        .send()
        .await
        .expect("add question");
    assert!(response.status().is_success());
    let quiz: Value = response.json().await.expect("quiz json");
    let questions = quiz["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[1]["position"], 1);
    // The appended question inherited the quiz default duration.
    assert_eq!(questions[1]["duration_seconds"], 30);

    // A bad multiple-choice answer is rejected.
    let response = server
        .client
        .post(server.url(&format!("/admin/quizzes/{quiz_id}/questions")))
        .json(&json!({
            "answer_type": "multiple_choice",
            "options": ["A", "B"],
            "correct_answer": "C"
        }))
        .send()
        .await
        .expect("add bad question");
    assert_eq!(response.status(), 400);

    // Reorder must name every question id.
    let response = server
        .client
        .post(server.url(&format!("/admin/quizzes/{quiz_id}/questions/reorder")))
        .json(&json!(["only-one-id"]))
        .send()
        .await
        .expect("reorder");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_start_without_questions_is_400() {
    let server = spawn_server().await;

    let quiz: Value = server
        .client
        .post(server.url("/admin/quizzes"))
        .json(&json!({ "name": "Empty" }))
        .send()
        .await
        .expect("create quiz")
        .json()
        .await
        .expect("quiz json");
    let quiz_id = quiz["id"].as_str().expect("quiz id");

    let session: Value = server
        .client
        .post(server.url("/admin/sessions"))
        .json(&json!({ "name": "Hollow", "quiz_ids": [quiz_id] }))
        .send()
        .await
        .expect("create session")
        .json()
        .await
        .expect("session json");
    let session_id = session["id"].as_str().expect("session id");

    let response = server
        .client
        .post(server.url(&format!("/admin/sessions/{session_id}/start")))
        .send()
        .await
        .expect("start");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_admin_websocket_streams_state() {
    let server = spawn_server().await;
    let (_quiz_id, session_id) = seed_game(&server).await;

    let (mut socket, _) =
        tokio_tungstenite::connect_async(server.ws_url(&format!("/ws/admin/{session_id}")))
            .await
            .expect("admin ws connect");

    // The heartbeat pushes a state frame within a second.
    let state = wait_for_state(&mut socket, Duration::from_secs(3), |_| true).await;
    assert_eq!(state["status"], "draft");
    assert_eq!(state["stage"], Value::Null);
}

#[tokio::test]
async fn test_player_websocket_game_flow() {
    let server = spawn_server().await;
    let (_quiz_id, session_id) = seed_game(&server).await;

    let (mut socket, _) =
        tokio_tungstenite::connect_async(server.ws_url(&format!("/ws/player/{session_id}")))
            .await
            .expect("player ws connect");

    socket
        .send(Message::Text(
            json!({ "type": "join", "name": "Alice" }).to_string().into(),
        ))
        .await
        .expect("send join");

    // Welcome carries the minted 8-character player id.
    let welcome = loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("welcome within deadline")
            .expect("socket open")
            .expect("frame ok");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).expect("welcome json");
            if value["type"] == "welcome" {
                break value;
            }
        }
    };
    let player_id = welcome["player"]["id"].as_str().expect("player id");
    assert_eq!(player_id.len(), 8);

    // Host starts the session and advances onto the question.
    for path in ["start", "next"] {
        let response = server
            .client
            .post(server.url(&format!("/admin/sessions/{session_id}/{path}")))
            .send()
            .await
            .expect("host action");
        assert!(response.status().is_success(), "{path} failed");
    }

    let state = wait_for_state(&mut socket, Duration::from_secs(5), |state| {
        state["stage"] == "question"
    })
    .await;
    assert_eq!(state["question"]["revealed"], false);
    assert_eq!(state["question"]["correct_answer"], Value::Null);

    // The only connected player answers; fast-forward finishes the game.
    socket
        .send(Message::Text(
            json!({ "type": "answer", "answer": "A" }).to_string().into(),
        ))
        .await
        .expect("send answer");

    let state = wait_for_state(&mut socket, Duration::from_secs(5), |state| {
        state["status"] == "finished"
    })
    .await;
    assert_eq!(state["players"][0]["score"], 1.0);
    assert_eq!(state["answers"][player_id], true);
}
