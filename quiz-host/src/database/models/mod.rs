//! Database models for quiz-host.

pub mod quiz;
pub mod session;

pub use quiz::{AnswerType, QuestionDbModel, QuizDbModel, ScoringType};
pub use session::{
    SessionAnswerDbModel, SessionDbModel, SessionPlayerDbModel, SessionQuizDbModel,
    SessionSnapshotDbModel, SessionStatus,
};

/// Decode a JSON-array TEXT column into a string list.
///
/// Malformed values decode to an empty list rather than failing the row.
pub(crate) fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encode a string list into its JSON-array TEXT column form.
pub(crate) fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
