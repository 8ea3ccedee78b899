//! The session runtime controller.
//!
//! Hosts at most one live session. Mutating operations (`start`,
//! `force_next`, `set_manual`, `resume`, `cancel` and the internal reveal
//! and advance steps) serialize on one async mutex. The stage cursor and
//! the per-session caches live behind sync locks that are never held across
//! an await; `submit_answer` deliberately skips the operation mutex and
//! relies on the answered-set reservation for its first-write-wins
//! guarantee, so the grader call happens without any lock held.
//!
//! Timer tasks carry the stage generation they were spawned for; a wake-up
//! whose generation no longer matches the cursor returns without acting,
//! which makes timer expiry and fast-forward idempotent against each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::database::models::{
    AnswerType, QuestionDbModel, SessionAnswerDbModel, SessionPlayerDbModel,
    SessionSnapshotDbModel,
};
use crate::database::repositories::{
    AnswerRepository, PlayerRepository, QuizRepository, SessionRepository, SnapshotRepository,
};
use crate::database::time::{datetime_to_rfc3339, rfc3339_to_datetime};
use crate::grader::TextGrader;
use crate::runtime::broadcast::{Broadcaster, SinkId};
use crate::runtime::state::{
    ClosestResultView, PlayerView, QuestionView, QuizIntroView, SessionStateView,
};
use crate::runtime::timeline::{self, TimelineEntry};
use crate::{Error, Result};

/// In-memory player cache entry.
#[derive(Debug, Clone)]
struct PlayerEntry {
    id: String,
    name: String,
    score: f64,
    connected: bool,
    joined_at: DateTime<Utc>,
}

impl PlayerEntry {
    fn to_view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            score: self.score,
            connected: self.connected,
        }
    }
}

/// The live stage cursor. Guarded by a sync mutex; critical sections stay
/// short and never await.
#[derive(Default)]
struct Cursor {
    active_session_id: Option<String>,
    timeline: Vec<Arc<TimelineEntry>>,
    current_index: i64,
    current_start: Option<DateTime<Utc>>,
    current_end: Option<DateTime<Utc>>,
    current_finalized: bool,
    /// Set when fast-forward has claimed the current stage, so racing
    /// submissions spawn at most one gap task.
    fast_forwarded: bool,
    /// Bumped on every stage entry and on cancel/finish; stale timer tasks
    /// compare against it before acting.
    generation: u64,
}

impl Cursor {
    fn current_entry(&self) -> Option<&Arc<TimelineEntry>> {
        if self.current_index < 0 {
            return None;
        }
        self.timeline.get(self.current_index as usize)
    }

    fn is_active(&self, session_id: &str) -> bool {
        self.active_session_id.as_deref() == Some(session_id)
    }
}

enum AdvanceStep {
    Finished,
    Entered(Arc<TimelineEntry>, u64),
}

/// Single-active-session runtime controller.
pub struct RuntimeController {
    clock: Arc<dyn Clock>,
    grader: Arc<dyn TextGrader>,
    sessions: Arc<dyn SessionRepository>,
    quizzes: Arc<dyn QuizRepository>,
    players_repo: Arc<dyn PlayerRepository>,
    answers_repo: Arc<dyn AnswerRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    broadcaster: Broadcaster,

    /// Serializes every mutating operation.
    op_lock: tokio::sync::Mutex<()>,
    cursor: parking_lot::Mutex<Cursor>,
    timer_task: parking_lot::Mutex<Option<JoinHandle<()>>>,

    // Per-session caches, keyed by session id. Only the active session's
    // entries are mutated by the stage machinery.
    players: DashMap<String, HashMap<String, PlayerEntry>>,
    answered: DashMap<String, HashSet<String>>,
    answer_results: DashMap<String, HashMap<String, Option<bool>>>,
    answer_values: DashMap<String, HashMap<String, Option<String>>>,
    closest_results: DashMap<String, Vec<ClosestResultView>>,
    scores_revealed: DashMap<String, bool>,
}

impl RuntimeController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        grader: Arc<dyn TextGrader>,
        sessions: Arc<dyn SessionRepository>,
        quizzes: Arc<dyn QuizRepository>,
        players_repo: Arc<dyn PlayerRepository>,
        answers_repo: Arc<dyn AnswerRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
    ) -> Self {
        Self {
            clock,
            grader,
            sessions,
            quizzes,
            players_repo,
            answers_repo,
            snapshots,
            broadcaster: Broadcaster::new(),
            op_lock: tokio::sync::Mutex::new(()),
            cursor: parking_lot::Mutex::new(Cursor::default()),
            timer_task: parking_lot::Mutex::new(None),
            players: DashMap::new(),
            answered: DashMap::new(),
            answer_results: DashMap::new(),
            answer_values: DashMap::new(),
            closest_results: DashMap::new(),
            scores_revealed: DashMap::new(),
        }
    }

    /// Whether the given session is the controller's live one.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.cursor.lock().is_active(session_id)
    }

    /// Start a session: build its timeline, mark it live and enter the
    /// first stage. Aborts any other live session first.
    pub async fn start(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.sessions.get_session(session_id).await?;

        let previous = self.cursor.lock().active_session_id.clone();
        if let Some(previous) = previous
            && previous != session_id
        {
            warn!(session_id = %previous, "Aborting live session before starting another");
            self.cancel_inner(&previous);
        }

        let timeline =
            timeline::build_timeline(session_id, self.sessions.as_ref(), self.quizzes.as_ref())
                .await?;
        if !timeline.iter().any(|entry| entry.is_question()) {
            return Err(Error::validation("Session has no questions to run"));
        }

        {
            let mut cursor = self.cursor.lock();
            cursor.active_session_id = Some(session_id.to_string());
            cursor.timeline = timeline;
            cursor.current_index = -1;
            cursor.current_start = None;
            cursor.current_end = None;
            cursor.current_finalized = false;
            cursor.fast_forwarded = false;
        }
        self.scores_revealed.insert(session_id.to_string(), false);

        let started_at = datetime_to_rfc3339(self.clock.now());
        self.sessions.mark_live(session_id, &started_at).await?;
        info!(session_id, "Session started");

        self.advance(session_id).await
    }

    /// Advance one stage at the host's request.
    pub async fn force_next(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        if !self.is_active(session_id) {
            return Err(Error::validation("Session is not active"));
        }
        self.sessions.get_session(session_id).await?;
        self.advance(session_id).await
    }

    /// Set or clear the host's manual override. Clearing it on a live
    /// question either advances (time already up) or restarts the timer
    /// with the remaining duration. Intro stages have no timer to restart.
    pub async fn set_manual(self: &Arc<Self>, session_id: &str, manual: bool) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.sessions.get_session(session_id).await?;
        self.sessions.set_manual_override(session_id, manual).await?;
        info!(session_id, manual, "Manual override changed");
        if manual {
            return Ok(());
        }

        let now = self.clock.now();
        let (entry, generation, remaining) = {
            let cursor = self.cursor.lock();
            if !cursor.is_active(session_id) {
                return Ok(());
            }
            let remaining = cursor
                .current_end
                .map(|end| (end - now).num_seconds().max(0))
                .unwrap_or(0);
            (cursor.current_entry().cloned(), cursor.generation, remaining)
        };

        if let Some(entry) = entry
            && entry.is_question()
        {
            if remaining <= 0 {
                self.advance(session_id).await?;
            } else {
                self.start_timer(session_id, &entry, generation, Some(remaining));
            }
        }
        Ok(())
    }

    /// Stop timers and drop all in-memory state for a session, if it is the
    /// active one. Idempotent; used by admin reset and delete.
    pub async fn cancel(&self, session_id: &str) {
        let _guard = self.op_lock.lock().await;
        self.cancel_inner(session_id);
    }

    fn cancel_inner(&self, session_id: &str) {
        {
            let mut cursor = self.cursor.lock();
            if !cursor.is_active(session_id) {
                return;
            }
            cursor.active_session_id = None;
            cursor.timeline = Vec::new();
            cursor.current_index = -1;
            cursor.current_start = None;
            cursor.current_end = None;
            cursor.current_finalized = false;
            cursor.fast_forwarded = false;
            cursor.generation += 1;
        }
        self.abort_timer();
        self.answered.remove(session_id);
        self.scores_revealed.remove(session_id);
        self.answer_results.remove(session_id);
        self.answer_values.remove(session_id);
        self.closest_results.remove(session_id);
        self.players.remove(session_id);
        self.broadcaster.clear_session(session_id);
        info!(session_id, "Session cancelled");
    }

    /// Resume a session from its newest snapshot after a restart.
    pub async fn resume(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let session = self.sessions.get_session(session_id).await?;
        let snapshot = self
            .snapshots
            .latest_for_session(session_id)
            .await?
            .ok_or_else(|| Error::validation("No snapshot available to resume"))?;

        let timeline =
            timeline::build_timeline(session_id, self.sessions.as_ref(), self.quizzes.as_ref())
                .await?;
        if snapshot.current_index < 0 || snapshot.current_index as usize >= timeline.len() {
            return Err(Error::validation(
                "Snapshot is out of range for current timeline",
            ));
        }

        let entry = timeline[snapshot.current_index as usize].clone();
        let current_start = snapshot
            .current_start
            .as_deref()
            .and_then(rfc3339_to_datetime);
        let current_end = snapshot.current_end.as_deref().and_then(rfc3339_to_datetime);

        let generation = {
            let mut cursor = self.cursor.lock();
            cursor.active_session_id = Some(session_id.to_string());
            cursor.timeline = timeline;
            cursor.current_index = snapshot.current_index;
            cursor.current_start = current_start;
            cursor.current_end = current_end;
            cursor.current_finalized = false;
            cursor.fast_forwarded = false;
            cursor.generation += 1;
            cursor.generation
        };
        self.scores_revealed
            .entry(session_id.to_string())
            .or_insert(false);

        self.sessions
            .restore_live(
                session_id,
                snapshot.active_quiz_index,
                snapshot.active_question_index,
            )
            .await?;

        self.load_players_from_store(session_id).await?;

        if let Some(question) = entry.question() {
            let rows = self
                .answers_repo
                .list_for_question(session_id, &question.id)
                .await?;
            let closest = question.is_closest_scored();
            let mut answered = HashSet::new();
            let mut results = HashMap::new();
            let mut values = HashMap::new();
            for row in rows {
                answered.insert(row.player_id.clone());
                // Closest questions are unfinalized while live, so their
                // surfaced correctness stays null until reveal.
                let result = if closest { None } else { Some(row.is_correct) };
                results.insert(row.player_id.clone(), result);
                values.insert(row.player_id.clone(), row.answer);
            }
            self.answered.insert(session_id.to_string(), answered);
            self.answer_results.insert(session_id.to_string(), results);
            self.answer_values.insert(session_id.to_string(), values);
            self.closest_results
                .insert(session_id.to_string(), Vec::new());
        }

        info!(
            session_id,
            index = snapshot.current_index,
            stage = entry.kind_str(),
            "Session resumed from snapshot"
        );

        if entry.is_question()
            && !session.manual_override
            && let Some(end) = current_end
        {
            let remaining = (end - self.clock.now()).num_seconds();
            if remaining > 0 {
                self.start_timer(session_id, &entry, generation, Some(remaining));
                self.broadcast_state(session_id).await;
                return Ok(());
            }
            // The deadline passed while we were down: reveal and move on.
            self.reveal_inner(session_id).await?;
            self.advance(session_id).await?;
            return Ok(());
        }

        self.broadcast_state(session_id).await;
        Ok(())
    }

    /// Ensure a player exists for a session and mark them connected.
    pub async fn register_player(
        &self,
        session_id: &str,
        name: &str,
        player_id: Option<&str>,
    ) -> Result<PlayerView> {
        let entry = {
            let mut session_players = self.players.entry(session_id.to_string()).or_default();
            match player_id.and_then(|pid| session_players.get_mut(pid)) {
                Some(existing) => {
                    if !name.trim().is_empty() {
                        existing.name = name.to_string();
                    }
                    existing.connected = true;
                    existing.clone()
                }
                None => {
                    let id = player_id
                        .map(ToString::to_string)
                        .unwrap_or_else(mint_player_id);
                    let name = if name.trim().is_empty() {
                        "Player".to_string()
                    } else {
                        name.to_string()
                    };
                    let player = PlayerEntry {
                        id: id.clone(),
                        name,
                        score: 0.0,
                        connected: true,
                        joined_at: self.clock.now(),
                    };
                    session_players.insert(id, player.clone());
                    player
                }
            }
        };

        let mut row = SessionPlayerDbModel::new(&entry.id, session_id, &entry.name);
        row.score = entry.score;
        row.connected = true;
        self.players_repo.upsert_player(&row).await?;

        info!(session_id, player_id = %entry.id, name = %entry.name, "Player registered");
        Ok(entry.to_view())
    }

    /// Mark a player disconnected, in memory and durably. Their submitted
    /// answers stay; they just stop counting toward fast-forward.
    pub async fn disconnect_player(&self, session_id: &str, player_id: &str) -> Result<()> {
        let found = match self.players.get_mut(session_id) {
            Some(mut session_players) => match session_players.get_mut(player_id) {
                Some(player) => {
                    player.connected = false;
                    true
                }
                None => false,
            },
            None => false,
        };
        if !found {
            return Ok(());
        }

        self.broadcast_state(session_id).await;
        let updated_at = datetime_to_rfc3339(self.clock.now());
        self.players_repo
            .set_connected(player_id, false, &updated_at)
            .await?;
        info!(session_id, player_id, "Player disconnected");
        Ok(())
    }

    /// Register an observer sink for a session.
    pub fn attach_sink(&self, session_id: &str) -> (SinkId, tokio::sync::mpsc::UnboundedReceiver<String>) {
        self.broadcaster.attach(session_id)
    }

    /// Remove an observer sink.
    pub fn detach_sink(&self, session_id: &str, sink_id: SinkId) {
        self.broadcaster.detach(session_id, sink_id);
    }

    /// Accept and score an answer, or reject it silently.
    ///
    /// Accepted iff the session is active, the stage is a question whose
    /// deadline has not passed, the player is registered and has not
    /// answered yet. The answered slot is reserved before any suspension
    /// point so a duplicate racing submission loses deterministically.
    pub async fn submit_answer(
        self: &Arc<Self>,
        session_id: &str,
        player_id: &str,
        answer: Option<&str>,
    ) -> Result<bool> {
        let question: Arc<QuestionDbModel> = {
            let cursor = self.cursor.lock();
            if !cursor.is_active(session_id) {
                return Ok(false);
            }
            let Some(question) = cursor.current_entry().and_then(|entry| entry.question()).cloned()
            else {
                return Ok(false);
            };
            if let Some(end) = cursor.current_end
                && self.clock.now() > end
            {
                return Ok(false);
            }
            let registered = self
                .players
                .get(session_id)
                .map(|players| players.contains_key(player_id))
                .unwrap_or(false);
            if !registered {
                return Ok(false);
            }
            let mut answered = self.answered.entry(session_id.to_string()).or_default();
            if !answered.insert(player_id.to_string()) {
                return Ok(false);
            }
            question
        };

        info!(
            session_id,
            player_id,
            question_id = %question.id,
            answer_type = %question.answer_type,
            scoring_type = ?question.scoring_type,
            answer = ?answer,
            "Answer received"
        );

        let (result, row_correct, delta): (Option<bool>, bool, f64) =
            if question.is_closest_scored() {
                // Deferred to finalize; the stored row is patched then.
                (None, false, 0.0)
            } else {
                let correct = match question.answer_kind() {
                    Some(AnswerType::MultipleChoice) | Some(AnswerType::Numeric) => {
                        answer.is_some() && answer == question.correct_answer.as_deref()
                    }
                    Some(AnswerType::Text) => {
                        self.grader
                            .evaluate(answer, question.correct_answer.as_deref())
                            .await
                    }
                    None => answer.is_some(),
                };
                (Some(correct), correct, if correct { 1.0 } else { 0.0 })
            };

        if delta > 0.0 {
            let new_score = {
                let mut session_players = self.players.entry(session_id.to_string()).or_default();
                match session_players.get_mut(player_id) {
                    Some(player) => {
                        player.score += delta;
                        Some(player.score)
                    }
                    None => None,
                }
            };
            if let Some(new_score) = new_score {
                let updated_at = datetime_to_rfc3339(self.clock.now());
                self.players_repo
                    .set_score(player_id, new_score, &updated_at)
                    .await?;
            }
        }

        let row = SessionAnswerDbModel::new(
            session_id,
            &question.id,
            player_id,
            answer.map(ToString::to_string),
            row_correct,
        );
        self.answers_repo.insert_answer(&row).await?;

        self.answer_results
            .entry(session_id.to_string())
            .or_default()
            .insert(player_id.to_string(), result);
        self.answer_values
            .entry(session_id.to_string())
            .or_default()
            .insert(player_id.to_string(), answer.map(ToString::to_string));

        info!(
            session_id,
            player_id,
            question_id = %question.id,
            is_correct = ?result,
            delta,
            "Answer recorded"
        );

        self.broadcast_state(session_id).await;
        self.maybe_fast_forward(session_id).await;
        Ok(true)
    }

    /// Flag whether final scores are shown to observers (post-finish).
    pub async fn set_scores_revealed(&self, session_id: &str, reveal: bool) {
        self.scores_revealed.insert(session_id.to_string(), reveal);
        self.broadcast_state(session_id).await;
    }

    /// Build the observer state view for a session.
    pub async fn state(&self, session_id: &str) -> Result<SessionStateView> {
        let session = self.sessions.get_session(session_id).await?;

        if !self.players.contains_key(session_id) {
            self.load_players_from_store(session_id).await?;
        }

        let now = self.clock.now();
        let (stage, quiz_intro, question_view) = {
            let cursor = self.cursor.lock();
            match cursor.current_entry() {
                Some(entry) if cursor.is_active(session_id) && session.is_live() => {
                    match entry.as_ref() {
                        TimelineEntry::QuizIntro {
                            quiz_index,
                            quiz,
                            questions,
                        } => (
                            Some("quiz_intro".to_string()),
                            Some(QuizIntroView {
                                quiz_index: *quiz_index,
                                quiz_id: quiz.id.clone(),
                                quiz_name: quiz.name.clone(),
                                quiz_description: quiz.description.clone(),
                                question_count: questions.len(),
                            }),
                            None,
                        ),
                        TimelineEntry::Question {
                            quiz_index,
                            question_index,
                            question,
                            ..
                        } => {
                            let revealed =
                                cursor.current_end.map(|end| now >= end).unwrap_or(false);
                            let remaining = cursor
                                .current_end
                                .map(|end| (end - now).num_seconds().max(0))
                                .unwrap_or(0);
                            (
                                Some("question".to_string()),
                                None,
                                Some(QuestionView {
                                    id: question.id.clone(),
                                    quiz_index: *quiz_index,
                                    question_index: *question_index,
                                    text: question.text.clone(),
                                    images: question.image_urls(),
                                    audio: question.audio_urls(),
                                    answer_type: question.answer_type.clone(),
                                    options: question.option_list(),
                                    scoring_type: question.scoring_type.clone(),
                                    duration_seconds: question.duration_seconds,
                                    speed_bonus: question.speed_bonus,
                                    started_at: cursor.current_start.map(datetime_to_rfc3339),
                                    closes_at: cursor.current_end.map(datetime_to_rfc3339),
                                    remaining_seconds: remaining,
                                    revealed,
                                    correct_answer: if revealed {
                                        question.correct_answer.clone()
                                    } else {
                                        None
                                    },
                                }),
                            )
                        }
                    }
                }
                _ => (None, None, None),
            }
        };

        let mut players: Vec<PlayerEntry> = self
            .players
            .get(session_id)
            .map(|session_players| session_players.values().cloned().collect())
            .unwrap_or_default();
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));

        Ok(SessionStateView {
            id: session.id.clone(),
            name: session.name.clone(),
            status: session.status.clone(),
            manual_override: session.manual_override,
            active_quiz_index: session.active_quiz_index,
            active_question_index: session.active_question_index,
            stage,
            quiz_intro,
            question: question_view,
            players: players.iter().map(PlayerEntry::to_view).collect(),
            now: datetime_to_rfc3339(now),
            scores_revealed: self
                .scores_revealed
                .get(session_id)
                .map(|flag| *flag)
                .unwrap_or(false),
            answers: self
                .answer_results
                .get(session_id)
                .map(|results| results.clone())
                .unwrap_or_default(),
            answer_values: self
                .answer_values
                .get(session_id)
                .map(|values| values.clone())
                .unwrap_or_default(),
            closest_results: self
                .closest_results
                .get(session_id)
                .map(|results| results.clone())
                .unwrap_or_default(),
        })
    }

    // ------------------------------------------------------------------
    // Internal stage machinery. Callers hold the operation mutex.
    // ------------------------------------------------------------------

    /// Move to the next stage, finalizing the one being left.
    async fn advance(self: &Arc<Self>, session_id: &str) -> Result<()> {
        // Claim the finalize before running it, so a task cancelled
        // mid-finalize can never be followed by a second full run.
        let outgoing = {
            let mut cursor = self.cursor.lock();
            match cursor.current_entry() {
                Some(entry) if entry.is_question() && !cursor.current_finalized => {
                    let question = entry.question().cloned();
                    cursor.current_finalized = true;
                    question
                }
                _ => None,
            }
        };
        if let Some(question) = outgoing {
            self.finalize_question_scores(session_id, &question).await?;
        }

        let now = self.clock.now();
        let step = {
            let mut cursor = self.cursor.lock();
            cursor.current_index += 1;
            if cursor.current_index as usize >= cursor.timeline.len() {
                cursor.active_session_id = None;
                cursor.current_start = None;
                cursor.current_end = None;
                cursor.generation += 1;
                AdvanceStep::Finished
            } else {
                let entry = cursor.timeline[cursor.current_index as usize].clone();
                // Intro stages have no clock window; questions run from now
                // to now + duration.
                (cursor.current_start, cursor.current_end) = match entry.as_ref() {
                    TimelineEntry::Question {
                        duration_seconds, ..
                    } => (Some(now), Some(now + Duration::seconds(*duration_seconds))),
                    TimelineEntry::QuizIntro { .. } => (None, None),
                };
                cursor.current_finalized = false;
                cursor.fast_forwarded = false;
                cursor.generation += 1;
                let generation = cursor.generation;
                AdvanceStep::Entered(entry, generation)
            }
        };

        match step {
            AdvanceStep::Finished => {
                self.sessions
                    .mark_finished(session_id, &datetime_to_rfc3339(now))
                    .await?;
                info!(session_id, "Session finished");
                self.broadcast_state(session_id).await;
                // Last: aborting may hit this very task at its next await.
                self.abort_timer();
                Ok(())
            }
            AdvanceStep::Entered(entry, generation) => {
                self.sessions
                    .set_active_indices(
                        session_id,
                        Some(entry.quiz_index() as i64),
                        entry.question_index().map(|index| index as i64),
                    )
                    .await?;

                if entry.is_question() {
                    self.answered.insert(session_id.to_string(), HashSet::new());
                    self.answer_results
                        .insert(session_id.to_string(), HashMap::new());
                    self.answer_values
                        .insert(session_id.to_string(), HashMap::new());
                    self.closest_results
                        .insert(session_id.to_string(), Vec::new());
                }

                info!(
                    session_id,
                    stage = entry.kind_str(),
                    quiz_index = entry.quiz_index(),
                    question_index = ?entry.question_index(),
                    "Stage entered"
                );

                self.broadcast_state(session_id).await;
                self.persist_snapshot(session_id, &entry).await?;
                // Last: a timer task driving this advance replaces (and
                // aborts) its own handle here, so nothing may await after.
                self.start_timer(session_id, &entry, generation, None);
                Ok(())
            }
        }
    }

    /// Spawn the question timer: sleep the duration, skip if the host took
    /// manual control, reveal, sleep the gap, advance. Replaces any prior
    /// timer task.
    fn start_timer(
        self: &Arc<Self>,
        session_id: &str,
        entry: &Arc<TimelineEntry>,
        generation: u64,
        duration_override: Option<i64>,
    ) {
        let TimelineEntry::Question {
            duration_seconds,
            gap_seconds,
            ..
        } = entry.as_ref()
        else {
            self.abort_timer();
            return;
        };

        let duration = duration_override.unwrap_or(*duration_seconds).max(0) as u64;
        let gap = (*gap_seconds).max(0) as u64;
        let controller = Arc::clone(self);
        let session_id = session_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_secs(duration)).await;

            match controller.sessions.get_session(&session_id).await {
                // The host has taken control; leave the stage alone.
                Ok(fresh) if fresh.manual_override => return,
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Timer failed to re-read session");
                    return;
                }
            }

            if !controller.reveal_current(&session_id, generation).await {
                return;
            }
            if gap > 0 {
                tokio::time::sleep(StdDuration::from_secs(gap)).await;
            }
            controller.advance_if_current(&session_id, generation).await;
        });

        let previous = self.timer_task.lock().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn abort_timer(&self) {
        if let Some(handle) = self.timer_task.lock().take() {
            handle.abort();
        }
    }

    /// Reveal the current question if the stage generation still matches.
    /// Returns whether the reveal happened.
    async fn reveal_current(self: &Arc<Self>, session_id: &str, generation: u64) -> bool {
        let _guard = self.op_lock.lock().await;
        {
            let cursor = self.cursor.lock();
            if cursor.generation != generation || !cursor.is_active(session_id) {
                return false;
            }
            match cursor.current_entry() {
                Some(entry) if entry.is_question() => {}
                _ => return false,
            }
        }
        match self.reveal_inner(session_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id, error = %e, "Failed to reveal question");
                false
            }
        }
    }

    /// Finalize (once) and close the current question now. Operation mutex
    /// must be held.
    async fn reveal_inner(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let pending = {
            let mut cursor = self.cursor.lock();
            match cursor.current_entry() {
                Some(entry) if entry.is_question() && !cursor.current_finalized => {
                    let question = entry.question().cloned();
                    cursor.current_finalized = true;
                    question
                }
                _ => None,
            }
        };
        if let Some(question) = pending {
            self.finalize_question_scores(session_id, &question).await?;
        }
        // Early reveals (fast-forward) close the window at the reveal time.
        self.cursor.lock().current_end = Some(self.clock.now());
        self.broadcast_state(session_id).await;
        Ok(())
    }

    /// Advance if the stage generation still matches; stale wake-ups no-op.
    async fn advance_if_current(self: &Arc<Self>, session_id: &str, generation: u64) {
        let _guard = self.op_lock.lock().await;
        {
            let cursor = self.cursor.lock();
            if cursor.generation != generation || !cursor.is_active(session_id) {
                return;
            }
        }
        if let Err(e) = self.advance(session_id).await {
            error!(session_id, error = %e, "Timed advance failed");
        }
    }

    /// Fast-forward when every connected player has answered the current
    /// question: reveal immediately, then run the gap and advance.
    async fn maybe_fast_forward(self: &Arc<Self>, session_id: &str) {
        let (entry, generation) = {
            let cursor = self.cursor.lock();
            if !cursor.is_active(session_id) {
                return;
            }
            match cursor.current_entry() {
                Some(entry) if entry.is_question() => (entry.clone(), cursor.generation),
                _ => return,
            }
        };

        let connected: Vec<String> = self
            .players
            .get(session_id)
            .map(|players| {
                players
                    .values()
                    .filter(|player| player.connected)
                    .map(|player| player.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        if connected.is_empty() {
            return;
        }

        let all_answered = self
            .answered
            .get(session_id)
            .map(|answered| connected.iter().all(|id| answered.contains(id)))
            .unwrap_or(false);
        if !all_answered {
            return;
        }

        // Claim the stage so racing final answers spawn one gap task.
        {
            let mut cursor = self.cursor.lock();
            if cursor.generation != generation || cursor.fast_forwarded {
                return;
            }
            cursor.fast_forwarded = true;
        }

        info!(session_id, "All connected players answered; fast-forwarding");

        let gap = entry.gap_seconds().max(0) as u64;
        let controller = Arc::clone(self);
        let session_id = session_id.to_string();
        let handle = tokio::spawn(async move {
            if !controller.reveal_current(&session_id, generation).await {
                return;
            }
            if gap > 0 {
                tokio::time::sleep(StdDuration::from_secs(gap)).await;
            }
            controller.advance_if_current(&session_id, generation).await;
        });

        let previous = self.timer_task.lock().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Closest-value finalization; see the scoring rules in the module
    /// docs. Idempotence is guaranteed by `current_finalized` at the call
    /// sites.
    async fn finalize_question_scores(
        &self,
        session_id: &str,
        question: &QuestionDbModel,
    ) -> Result<()> {
        if !question.is_closest_scored() {
            return Ok(());
        }
        let Some(target) = question
            .correct_answer
            .as_deref()
            .and_then(|answer| answer.trim().parse::<f64>().ok())
        else {
            return Ok(());
        };

        let answers = self
            .answers_repo
            .list_for_question(session_id, &question.id)
            .await?;

        // Keep submission order so equal distances rank by arrival.
        let parsed: Vec<(&SessionAnswerDbModel, f64)> = answers
            .iter()
            .filter_map(|answer| {
                answer
                    .answer
                    .as_deref()
                    .and_then(|raw| raw.trim().parse::<f64>().ok())
                    .map(|value| (answer, (value - target).abs()))
            })
            .collect();
        if parsed.is_empty() {
            return Ok(());
        }

        let min_diff = parsed.iter().map(|(_, diff)| *diff).fold(f64::INFINITY, f64::min);
        let max_diff = parsed
            .iter()
            .map(|(_, diff)| *diff)
            .fold(f64::NEG_INFINITY, f64::max);
        let range = max_diff - min_diff;

        struct Award {
            player_id: String,
            answer: Option<String>,
            distance: f64,
            delta: f64,
            is_exact: bool,
        }

        let mut awards: Vec<Award> = parsed
            .iter()
            .map(|(answer, diff)| {
                let base = if range > 0.0 {
                    1.0 - ((diff - min_diff) / range)
                } else {
                    1.0
                };
                let bonus = if *diff == 0.0 { 0.5 } else { 0.0 };
                Award {
                    player_id: answer.player_id.clone(),
                    answer: answer.answer.clone(),
                    distance: *diff,
                    delta: (base + bonus).clamp(0.0, 1.5),
                    is_exact: *diff == 0.0,
                }
            })
            .collect();
        awards.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let ranking: Vec<ClosestResultView> = awards
            .iter()
            .map(|award| ClosestResultView {
                player_id: award.player_id.clone(),
                answer: award.answer.clone(),
                distance: award.distance,
                is_exact: award.is_exact,
            })
            .collect();
        self.closest_results
            .insert(session_id.to_string(), ranking);

        info!(
            session_id,
            question_id = %question.id,
            target,
            entries = awards.len(),
            "Closest scoring finalized"
        );

        let updated_at = datetime_to_rfc3339(self.clock.now());
        for award in &awards {
            {
                let mut session_players = self.players.entry(session_id.to_string()).or_default();
                if let Some(player) = session_players.get_mut(&award.player_id) {
                    player.score += award.delta;
                }
            }
            self.players_repo
                .add_score(&award.player_id, award.delta, &updated_at)
                .await?;
            let is_correct = award.is_exact || award.delta > 0.0;
            self.answers_repo
                .set_correct(session_id, &question.id, &award.player_id, is_correct)
                .await?;
            self.answer_results
                .entry(session_id.to_string())
                .or_default()
                .insert(award.player_id.clone(), Some(award.is_exact));
        }

        Ok(())
    }

    async fn persist_snapshot(&self, session_id: &str, entry: &Arc<TimelineEntry>) -> Result<()> {
        let (current_index, current_start, current_end) = {
            let cursor = self.cursor.lock();
            (cursor.current_index, cursor.current_start, cursor.current_end)
        };

        let mut snapshot = SessionSnapshotDbModel::new(session_id, current_index);
        snapshot.current_entry_kind = Some(entry.kind_str().to_string());
        snapshot.quiz_id = entry.intro_quiz().map(|quiz| quiz.id.clone());
        snapshot.question_id = entry.question().map(|question| question.id.clone());
        snapshot.active_quiz_index = Some(entry.quiz_index() as i64);
        snapshot.active_question_index = entry.question_index().map(|index| index as i64);
        snapshot.current_start = current_start.map(datetime_to_rfc3339);
        snapshot.current_end = current_end.map(datetime_to_rfc3339);
        self.snapshots.insert_snapshot(&snapshot).await
    }

    async fn load_players_from_store(&self, session_id: &str) -> Result<()> {
        let rows = self.players_repo.list_for_session(session_id).await?;
        let mut cache = HashMap::new();
        for row in rows {
            let joined_at = rfc3339_to_datetime(&row.created_at).unwrap_or_else(|| self.clock.now());
            cache.insert(
                row.id.clone(),
                PlayerEntry {
                    id: row.id,
                    name: row.name,
                    score: row.score,
                    connected: row.connected,
                    joined_at,
                },
            );
        }
        self.players.insert(session_id.to_string(), cache);
        self.answer_values
            .insert(session_id.to_string(), HashMap::new());
        Ok(())
    }

    async fn broadcast_state(&self, session_id: &str) {
        if self.broadcaster.sink_count(session_id) == 0 {
            return;
        }
        match self.state(session_id).await {
            Ok(state) => self.broadcaster.broadcast(session_id, &state),
            Err(e) => warn!(session_id, error = %e, "Failed to build state for broadcast"),
        }
    }
}

/// Mint a short player token, mirroring the 8-character join codes the
/// clients display.
fn mint_player_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}
