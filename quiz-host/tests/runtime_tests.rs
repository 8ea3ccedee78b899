//! Integration tests for the session runtime controller.
//!
//! A manual clock drives deadlines, so tests only sleep for the short
//! real-time gaps of fast-forward and timer tasks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;

use quiz_host::clock::{Clock, ManualClock};
use quiz_host::database::models::{
    AnswerType, QuestionDbModel, QuizDbModel, SessionDbModel, SessionQuizDbModel, SessionStatus,
};
use quiz_host::database::repositories::{
    PlayerRepository, QuizRepository, SessionRepository, SqlxAnswerRepository,
    SqlxPlayerRepository, SqlxQuizRepository, SqlxSessionRepository, SqlxSnapshotRepository,
};
use quiz_host::database::{DbPool, init_pool, run_migrations};
use quiz_host::grader::{OpenAiGrader, TextGrader};
use quiz_host::runtime::{RuntimeController, SessionStateView};
use quiz_host::Error;

/// Grader double with a fixed verdict.
struct FixedGrader(bool);

#[async_trait]
impl TextGrader for FixedGrader {
    async fn evaluate(&self, _user_answer: Option<&str>, _target_answer: Option<&str>) -> bool {
        self.0
    }
}

struct Harness {
    controller: Arc<RuntimeController>,
    clock: Arc<ManualClock>,
    pool: DbPool,
    quiz_repo: Arc<SqlxQuizRepository>,
    session_repo: Arc<SqlxSessionRepository>,
    player_repo: Arc<SqlxPlayerRepository>,
    _dir: tempfile::TempDir,
}

fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 12, 24, 20, 0, 0).unwrap()
}

fn build_controller(
    pool: &DbPool,
    clock: &Arc<ManualClock>,
    grader: Arc<dyn TextGrader>,
) -> Arc<RuntimeController> {
    Arc::new(RuntimeController::new(
        Arc::clone(clock) as Arc<dyn Clock>,
        grader,
        Arc::new(SqlxSessionRepository::new(pool.clone())),
        Arc::new(SqlxQuizRepository::new(pool.clone())),
        Arc::new(SqlxPlayerRepository::new(pool.clone())),
        Arc::new(SqlxAnswerRepository::new(pool.clone())),
        Arc::new(SqlxSnapshotRepository::new(pool.clone())),
    ))
}

async fn harness() -> Harness {
    harness_with_grader(Arc::new(OpenAiGrader::new(
        None,
        "gpt-3.5-turbo",
        StdDuration::from_secs(1),
    )))
    .await
}

async fn harness_with_grader(grader: Arc<dyn TextGrader>) -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}/runtime.db?mode=rwc", dir.path().display());
    let pool = init_pool(&url).await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    let clock = Arc::new(ManualClock::new(start_instant()));
    let controller = build_controller(&pool, &clock, grader);

    Harness {
        controller,
        clock,
        quiz_repo: Arc::new(SqlxQuizRepository::new(pool.clone())),
        session_repo: Arc::new(SqlxSessionRepository::new(pool.clone())),
        player_repo: Arc::new(SqlxPlayerRepository::new(pool.clone())),
        pool,
        _dir: dir,
    }
}

fn question(
    quiz_id: &str,
    answer_type: AnswerType,
    correct: Option<&str>,
    duration: i64,
    position: i64,
) -> QuestionDbModel {
    let mut question = QuestionDbModel::new(quiz_id, answer_type);
    question.correct_answer = correct.map(ToString::to_string);
    question.duration_seconds = duration;
    question.position = position;
    question
}

/// One quiz, given questions, zero inter-question gap. Returns session id.
async fn seed_session(harness: &Harness, questions: Vec<QuestionDbModel>) -> String {
    let mut quiz = QuizDbModel::new("Test quiz");
    quiz.gap_seconds = 0;
    let questions: Vec<QuestionDbModel> = questions
        .into_iter()
        .map(|mut q| {
            q.quiz_id = quiz.id.clone();
            q
        })
        .collect();
    harness.quiz_repo.create_quiz(&quiz, &questions).await.unwrap();

    let session = SessionDbModel::new("Game night");
    let links = vec![SessionQuizDbModel::new(&session.id, &quiz.id, 0)];
    harness
        .session_repo
        .create_session(&session, &links)
        .await
        .unwrap();
    session.id
}

async fn wait_until<F>(
    controller: &Arc<RuntimeController>,
    session_id: &str,
    timeout_ms: u64,
    pred: F,
) -> SessionStateView
where
    F: Fn(&SessionStateView) -> bool,
{
    let deadline = std::time::Instant::now() + StdDuration::from_millis(timeout_ms);
    loop {
        let state = controller.state(session_id).await.expect("state should build");
        if pred(&state) {
            return state;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "condition not met in time; last state: {state:?}"
        );
        tokio::time::sleep(StdDuration::from_millis(25)).await;
    }
}

/// Start and move past the intro to the first question.
async fn start_on_first_question(harness: &Harness, session_id: &str) {
    harness.controller.start(session_id).await.unwrap();
    harness.controller.force_next(session_id).await.unwrap();
}

#[tokio::test]
async fn test_start_unknown_session() {
    let harness = harness().await;
    let result = harness.controller.start("nope").await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn test_start_without_questions_fails() {
    let harness = harness().await;
    let session_id = seed_session(&harness, vec![]).await;

    let result = harness.controller.start(&session_id).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(!harness.controller.is_active(&session_id));
}

#[tokio::test]
async fn test_start_enters_intro_then_question() {
    let harness = harness().await;
    let quiz_question = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![quiz_question]).await;

    harness.controller.start(&session_id).await.unwrap();
    let state = harness.controller.state(&session_id).await.unwrap();
    assert_eq!(state.status, "live");
    assert_eq!(state.stage.as_deref(), Some("quiz_intro"));
    let intro = state.quiz_intro.expect("intro payload");
    assert_eq!(intro.question_count, 1);
    assert_eq!(state.active_quiz_index, Some(0));
    assert_eq!(state.active_question_index, None);

    harness.controller.force_next(&session_id).await.unwrap();
    let state = harness.controller.state(&session_id).await.unwrap();
    assert_eq!(state.stage.as_deref(), Some("question"));
    let question = state.question.expect("question payload");
    assert_eq!(question.duration_seconds, 30);
    assert_eq!(question.remaining_seconds, 30);
    assert!(!question.revealed);
    // The correct answer is hidden until reveal.
    assert_eq!(question.correct_answer, None);
    assert_eq!(state.active_question_index, Some(0));
}

#[tokio::test]
async fn test_multiple_choice_scoring_and_fast_forward() {
    let harness = harness().await;
    let q = {
        let mut q = question("", AnswerType::MultipleChoice, Some("A"), 10, 0);
        q.set_option_list(&["A".to_string(), "B".to_string()]);
        q
    };
    let session_id = seed_session(&harness, vec![q]).await;

    let p1 = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();
    let p2 = harness
        .controller
        .register_player(&session_id, "Bob", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;

    assert!(
        harness
            .controller
            .submit_answer(&session_id, &p1.id, Some("A"))
            .await
            .unwrap()
    );
    // Duplicate submission is rejected and changes nothing.
    assert!(
        !harness
            .controller
            .submit_answer(&session_id, &p1.id, Some("B"))
            .await
            .unwrap()
    );
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &p2.id, Some("B"))
            .await
            .unwrap()
    );

    // Both connected players answered: fast-forward ends the session.
    let state = wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;

    let scores: std::collections::HashMap<&str, f64> = state
        .players
        .iter()
        .map(|player| (player.id.as_str(), player.score))
        .collect();
    assert_eq!(scores[p1.id.as_str()], 1.0);
    assert_eq!(scores[p2.id.as_str()], 0.0);
    assert_eq!(state.answers[&p1.id], Some(true));
    assert_eq!(state.answers[&p2.id], Some(false));
    assert_eq!(state.answer_values[&p1.id].as_deref(), Some("A"));

    // The persisted scores match the in-memory ones.
    let stored = harness.player_repo.get_player(&p1.id).await.unwrap().unwrap();
    assert_eq!(stored.score, 1.0);

    let session = harness.session_repo.get_session(&session_id).await.unwrap();
    assert_eq!(session.status_kind(), Some(SessionStatus::Finished));
    assert!(!harness.controller.is_active(&session_id));
}

#[tokio::test]
async fn test_closest_scoring_ranks_and_bonuses() {
    let harness = harness().await;
    let q = {
        let mut q = question("", AnswerType::Numeric, Some("100"), 10, 0);
        q.scoring_type = Some("closest".to_string());
        q
    };
    let session_id = seed_session(&harness, vec![q]).await;

    let p90 = harness
        .controller
        .register_player(&session_id, "Nina", None)
        .await
        .unwrap();
    let p110 = harness
        .controller
        .register_player(&session_id, "Oscar", None)
        .await
        .unwrap();
    let p100 = harness
        .controller
        .register_player(&session_id, "Pia", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;

    for (player, answer) in [(&p90, "90"), (&p110, "110"), (&p100, "100")] {
        assert!(
            harness
                .controller
                .submit_answer(&session_id, &player.id, Some(answer))
                .await
                .unwrap()
        );
    }

    // Correctness stays null while the closest question is live, then the
    // fast-forward reveal finalizes everything.
    let state = wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;

    let scores: std::collections::HashMap<&str, f64> = state
        .players
        .iter()
        .map(|player| (player.id.as_str(), player.score))
        .collect();
    assert_eq!(scores[p100.id.as_str()], 1.5);
    assert_eq!(scores[p90.id.as_str()], 0.0);
    assert_eq!(scores[p110.id.as_str()], 0.0);

    // Ranking ascends by distance; the 90/110 tie keeps submission order.
    let ranking: Vec<&str> = state
        .closest_results
        .iter()
        .map(|entry| entry.player_id.as_str())
        .collect();
    assert_eq!(ranking, vec![p100.id.as_str(), p90.id.as_str(), p110.id.as_str()]);
    assert!(state.closest_results[0].is_exact);

    assert_eq!(state.answers[&p100.id], Some(true));
    assert_eq!(state.answers[&p90.id], Some(false));
}

#[tokio::test]
async fn test_late_answer_rejected_and_reveal_exposes_answer() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;
    let player = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;

    harness.clock.advance(Duration::seconds(31));

    assert!(
        !harness
            .controller
            .submit_answer(&session_id, &player.id, Some("A"))
            .await
            .unwrap()
    );

    let state = harness.controller.state(&session_id).await.unwrap();
    let question = state.question.expect("question payload");
    assert!(question.revealed);
    assert_eq!(question.remaining_seconds, 0);
    assert_eq!(question.correct_answer.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_manual_override_holds_then_clearing_advances() {
    let harness = harness().await;
    let first = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let second = question("", AnswerType::MultipleChoice, Some("B"), 30, 1);
    let session_id = seed_session(&harness, vec![first, second]).await;

    start_on_first_question(&harness, &session_id).await;
    harness.controller.set_manual(&session_id, true).await.unwrap();

    // Time runs out while the host holds the stage.
    harness.clock.advance(Duration::seconds(31));
    let state = harness.controller.state(&session_id).await.unwrap();
    assert_eq!(state.question.unwrap().question_index, 0);

    // Clearing the override with no time left advances immediately.
    harness.controller.set_manual(&session_id, false).await.unwrap();
    let state = harness.controller.state(&session_id).await.unwrap();
    assert_eq!(state.question.expect("second question").question_index, 1);
}

#[tokio::test]
async fn test_manual_clear_with_time_left_stays_on_stage() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    start_on_first_question(&harness, &session_id).await;
    harness.controller.set_manual(&session_id, true).await.unwrap();
    harness.clock.advance(Duration::seconds(10));
    harness.controller.set_manual(&session_id, false).await.unwrap();

    let state = harness.controller.state(&session_id).await.unwrap();
    let question = state.question.expect("question payload");
    assert_eq!(question.question_index, 0);
    assert_eq!(question.remaining_seconds, 20);
    assert!(!question.revealed);
}

#[tokio::test]
async fn test_text_answer_equality_fallback() {
    let harness = harness().await;
    let q = question("", AnswerType::Text, Some("Rudolph"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;
    let player = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;

    // No grader key configured: trimmed case-insensitive equality decides.
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &player.id, Some("  rudolph "))
            .await
            .unwrap()
    );
    let state = wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;
    assert_eq!(state.players[0].score, 1.0);
}

#[tokio::test]
async fn test_text_answer_uses_oracle_verdict() {
    let harness = harness_with_grader(Arc::new(FixedGrader(true))).await;
    let q = question("", AnswerType::Text, Some("Rudolph"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;
    let player = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;

    // A lenient oracle accepts an answer equality would reject.
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &player.id, Some("the red-nosed one"))
            .await
            .unwrap()
    );
    let state = wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;
    assert_eq!(state.players[0].score, 1.0);
}

#[tokio::test]
async fn test_fast_forward_skips_disconnected_players() {
    let harness = harness().await;
    let q = {
        let mut q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
        q.set_option_list(&["A".to_string(), "B".to_string()]);
        q
    };
    let session_id = seed_session(&harness, vec![q]).await;

    let p1 = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();
    let p2 = harness
        .controller
        .register_player(&session_id, "Bob", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;
    harness
        .controller
        .disconnect_player(&session_id, &p2.id)
        .await
        .unwrap();

    // Only Alice is connected, so her answer completes the question.
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &p1.id, Some("A"))
            .await
            .unwrap()
    );
    wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;
}

#[tokio::test]
async fn test_resume_restores_mid_question_state() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;
    let player = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &player.id, Some("A"))
            .await
            .unwrap()
    );
    let before = harness.controller.state(&session_id).await.unwrap();
    let closes_at_before = before.question.expect("question payload").closes_at;

    // Simulate a process restart: a fresh controller over the same store.
    harness.clock.advance(Duration::seconds(10));
    let revived = build_controller(
        &harness.pool,
        &harness.clock,
        Arc::new(FixedGrader(false)),
    );
    revived.resume(&session_id).await.unwrap();

    assert!(revived.is_active(&session_id));
    let state = revived.state(&session_id).await.unwrap();
    assert_eq!(state.status, "live");
    let question = state.question.expect("question payload");
    assert_eq!(question.closes_at, closes_at_before);
    assert_eq!(question.remaining_seconds, 20);

    // The answered set and raw answers came back from the store.
    assert_eq!(state.answer_values[&player.id].as_deref(), Some("A"));
    assert!(
        !revived
            .submit_answer(&session_id, &player.id, Some("B"))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_resume_past_deadline_reveals_and_finishes() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;
    let player = harness
        .controller
        .register_player(&session_id, "Alice", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &player.id, Some("A"))
            .await
            .unwrap()
    );

    // Come back after the deadline has long passed.
    harness.clock.advance(Duration::seconds(120));
    let revived = build_controller(
        &harness.pool,
        &harness.clock,
        Arc::new(FixedGrader(false)),
    );
    revived.resume(&session_id).await.unwrap();

    let session = harness.session_repo.get_session(&session_id).await.unwrap();
    assert_eq!(session.status_kind(), Some(SessionStatus::Finished));
    assert!(!revived.is_active(&session_id));
}

#[tokio::test]
async fn test_resume_without_snapshot_fails() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    let result = harness.controller.resume(&session_id).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_cancel_clears_runtime_state() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    start_on_first_question(&harness, &session_id).await;
    assert!(harness.controller.is_active(&session_id));

    harness.controller.cancel(&session_id).await;
    assert!(!harness.controller.is_active(&session_id));

    let state = harness.controller.state(&session_id).await.unwrap();
    assert_eq!(state.stage, None);
    assert!(state.question.is_none());

    // Cancelling again is a no-op.
    harness.controller.cancel(&session_id).await;
}

#[tokio::test]
async fn test_force_next_requires_active_session() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    let result = harness.controller.force_next(&session_id).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_single_live_session_invariant() {
    let harness = harness().await;
    let q1 = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let first = seed_session(&harness, vec![q1]).await;
    let q2 = question("", AnswerType::MultipleChoice, Some("B"), 30, 0);
    let second = seed_session(&harness, vec![q2]).await;

    harness.controller.start(&first).await.unwrap();
    assert!(harness.controller.is_active(&first));

    // Starting another session aborts the first.
    harness.controller.start(&second).await.unwrap();
    assert!(!harness.controller.is_active(&first));
    assert!(harness.controller.is_active(&second));
}

#[tokio::test]
async fn test_scores_revealed_flag_surfaces() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    let state = harness.controller.state(&session_id).await.unwrap();
    assert!(!state.scores_revealed);

    harness.controller.set_scores_revealed(&session_id, true).await;
    let state = harness.controller.state(&session_id).await.unwrap();
    assert!(state.scores_revealed);
}

#[tokio::test]
async fn test_timer_expiry_advances_session() {
    let harness = harness().await;
    // Short real duration: the timer loop itself drives the transition.
    let q = question("", AnswerType::MultipleChoice, Some("A"), 1, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    start_on_first_question(&harness, &session_id).await;

    let state = wait_until(&harness.controller, &session_id, 8_000, |state| {
        state.status == "finished"
    })
    .await;
    assert_eq!(state.stage, None);
}

#[tokio::test]
async fn test_attached_sink_receives_broadcasts() {
    let harness = harness().await;
    let q = question("", AnswerType::MultipleChoice, Some("A"), 30, 0);
    let session_id = seed_session(&harness, vec![q]).await;

    let (sink_id, mut rx) = harness.controller.attach_sink(&session_id);
    harness.controller.start(&session_id).await.unwrap();

    let payload = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
        .await
        .expect("broadcast within deadline")
        .expect("sink still attached");
    assert!(payload.contains("\"type\":\"state\""));
    assert!(payload.contains("quiz_intro"));

    harness.controller.detach_sink(&session_id, sink_id);
}

/// Closest scoring is monotone: a strictly closer answer never scores less.
#[rstest]
#[case("99", "90")]
#[case("100", "101")]
#[case("105", "50")]
#[tokio::test]
async fn test_closest_score_monotonicity(#[case] closer: &str, #[case] farther: &str) {
    let harness = harness().await;
    let q = {
        let mut q = question("", AnswerType::Numeric, Some("100"), 10, 0);
        q.scoring_type = Some("closest".to_string());
        q
    };
    let session_id = seed_session(&harness, vec![q]).await;

    let a = harness
        .controller
        .register_player(&session_id, "Closer", None)
        .await
        .unwrap();
    let b = harness
        .controller
        .register_player(&session_id, "Farther", None)
        .await
        .unwrap();

    start_on_first_question(&harness, &session_id).await;
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &a.id, Some(closer))
            .await
            .unwrap()
    );
    assert!(
        harness
            .controller
            .submit_answer(&session_id, &b.id, Some(farther))
            .await
            .unwrap()
    );

    let state = wait_until(&harness.controller, &session_id, 5_000, |state| {
        state.status == "finished"
    })
    .await;
    let scores: std::collections::HashMap<&str, f64> = state
        .players
        .iter()
        .map(|player| (player.id.as_str(), player.score))
        .collect();
    assert!(scores[a.id.as_str()] >= scores[b.id.as_str()]);
}
