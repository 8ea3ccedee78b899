//! Observer-facing state payloads.
//!
//! One `SessionStateView` is built per broadcast or poll and serialized
//! once; the shape matches what admin and player clients render.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

/// A player as surfaced to observers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub score: f64,
    pub connected: bool,
}

/// Intro stage payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizIntroView {
    pub quiz_index: usize,
    pub quiz_id: String,
    pub quiz_name: String,
    pub quiz_description: Option<String>,
    pub question_count: usize,
}

/// Question stage payload.
///
/// `correct_answer` is only present once the question is revealed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    pub id: String,
    pub quiz_index: usize,
    pub question_index: usize,
    pub text: Option<String>,
    pub images: Vec<String>,
    pub audio: Vec<String>,
    pub answer_type: String,
    pub options: Vec<String>,
    pub scoring_type: Option<String>,
    pub duration_seconds: i64,
    pub speed_bonus: bool,
    pub started_at: Option<String>,
    pub closes_at: Option<String>,
    pub remaining_seconds: i64,
    pub revealed: bool,
    pub correct_answer: Option<String>,
}

/// One entry of the closest-value ranking, ascending by distance.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClosestResultView {
    pub player_id: String,
    pub answer: Option<String>,
    pub distance: f64,
    pub is_exact: bool,
}

/// Full session state as pushed to observers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionStateView {
    pub id: String,
    pub name: String,
    pub status: String,
    pub manual_override: bool,
    pub active_quiz_index: Option<i64>,
    pub active_question_index: Option<i64>,
    pub stage: Option<String>,
    pub quiz_intro: Option<QuizIntroView>,
    pub question: Option<QuestionView>,
    pub players: Vec<PlayerView>,
    pub now: String,
    pub scores_revealed: bool,
    /// player id -> correctness; `None` while a closest question is live.
    pub answers: HashMap<String, Option<bool>>,
    /// player id -> raw submitted answer.
    pub answer_values: HashMap<String, Option<String>>,
    pub closest_results: Vec<ClosestResultView>,
}
