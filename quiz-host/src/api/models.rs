//! API request and response models (DTOs).
//!
//! Defines the data transfer objects for the admin endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::database::models::{QuestionDbModel, QuizDbModel, SessionDbModel};

// ============================================================================
// Quiz DTOs
// ============================================================================

/// Request to create a question, either nested in a quiz or appended later.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateQuestionRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub audio: Vec<String>,
    pub answer_type: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub scoring_type: Option<String>,
    /// Defaults to the quiz's default question duration.
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub speed_bonus: bool,
}

/// Request to create a quiz with its questions.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateQuizRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_question_duration")]
    pub default_question_duration: i64,
    #[serde(default = "default_gap_seconds")]
    pub gap_seconds: i64,
    #[serde(default)]
    pub questions: Vec<CreateQuestionRequest>,
}

fn default_question_duration() -> i64 {
    30
}

fn default_gap_seconds() -> i64 {
    3
}

/// Partial question update.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateQuestionRequest {
    pub text: Option<String>,
    pub images: Option<Vec<String>>,
    pub audio: Option<Vec<String>>,
    pub answer_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub scoring_type: Option<String>,
    pub duration_seconds: Option<i64>,
    pub speed_bonus: Option<bool>,
}

/// Question as returned by the admin endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: String,
    pub text: Option<String>,
    pub images: Vec<String>,
    pub audio: Vec<String>,
    pub answer_type: String,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub scoring_type: String,
    pub duration_seconds: i64,
    pub position: i64,
    pub speed_bonus: bool,
}

impl From<&QuestionDbModel> for QuestionResponse {
    fn from(question: &QuestionDbModel) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            images: question.image_urls(),
            audio: question.audio_urls(),
            answer_type: question.answer_type.clone(),
            options: question.option_list(),
            correct_answer: question.correct_answer.clone(),
            scoring_type: question
                .scoring_type
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "exact".to_string()),
            duration_seconds: question.duration_seconds,
            position: question.position,
            speed_bonus: question.speed_bonus,
        }
    }
}

/// Quiz with its questions in position order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_question_duration: i64,
    pub gap_seconds: i64,
    pub questions: Vec<QuestionResponse>,
}

impl QuizResponse {
    pub fn from_parts(quiz: &QuizDbModel, questions: &[QuestionDbModel]) -> Self {
        let mut ordered: Vec<&QuestionDbModel> = questions.iter().collect();
        ordered.sort_by_key(|question| question.position);
        Self {
            id: quiz.id.clone(),
            name: quiz.name.clone(),
            description: quiz.description.clone(),
            default_question_duration: quiz.default_question_duration,
            gap_seconds: quiz.gap_seconds,
            questions: ordered.into_iter().map(QuestionResponse::from).collect(),
        }
    }
}

// ============================================================================
// Session DTOs
// ============================================================================

/// Request to create a session from a playlist of quizzes.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub quiz_ids: Vec<String>,
}

/// Session row as returned by the admin endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub status: String,
    pub auto_advance: bool,
    pub manual_override: bool,
    pub active_quiz_index: Option<i64>,
    pub active_question_index: Option<i64>,
}

impl From<&SessionDbModel> for SessionResponse {
    fn from(session: &SessionDbModel) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            status: session.status.clone(),
            auto_advance: session.auto_advance,
            manual_override: session.manual_override,
            active_quiz_index: session.active_quiz_index,
            active_question_index: session.active_question_index,
        }
    }
}

/// Query parameter for the manual override toggle.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ManualParams {
    pub manual: bool,
}

/// Query parameter for the score reveal toggle.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RevealParams {
    #[serde(default = "default_reveal")]
    pub reveal: bool,
}

fn default_reveal() -> bool {
    true
}

/// Deletion acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: String,
}

// ============================================================================
// Media DTOs
// ============================================================================

/// Response for a stored media upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub content_type: String,
}

// ============================================================================
// Health DTOs
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}
