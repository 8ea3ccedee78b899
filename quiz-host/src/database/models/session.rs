//! Session, player, answer and snapshot database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_rfc3339;

/// Session lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    Live,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Live => "live",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "live" => Some(Self::Live),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Session database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionDbModel {
    pub id: String,
    pub name: String,
    pub status: String,
    pub auto_advance: bool,
    pub manual_override: bool,
    pub active_quiz_index: Option<i64>,
    pub active_question_index: Option<i64>,
    /// RFC 3339 timestamp, set when the session goes live
    pub started_at: Option<String>,
    /// RFC 3339 timestamp, set when the timeline is exhausted
    pub finished_at: Option<String>,
}

impl SessionDbModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: SessionStatus::Draft.as_str().to_string(),
            auto_advance: true,
            manual_override: false,
            active_quiz_index: None,
            active_question_index: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status_kind(&self) -> Option<SessionStatus> {
        SessionStatus::parse(&self.status)
    }

    pub fn is_live(&self) -> bool {
        self.status_kind() == Some(SessionStatus::Live)
    }
}

/// Ordered link between a session and a quiz in its playlist.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionQuizDbModel {
    pub id: String,
    pub session_id: String,
    pub quiz_id: String,
    pub position: i64,
}

impl SessionQuizDbModel {
    pub fn new(session_id: impl Into<String>, quiz_id: impl Into<String>, position: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            quiz_id: quiz_id.into(),
            position,
        }
    }
}

/// Session player database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionPlayerDbModel {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub score: f64,
    pub connected: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionPlayerDbModel {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            name: name.into(),
            score: 0.0,
            connected: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Session answer database model.
///
/// At most one row exists per (session, question, player), enforced by a
/// unique index; `is_correct` is patched on finalize for closest questions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionAnswerDbModel {
    pub id: String,
    pub session_id: String,
    pub question_id: String,
    pub player_id: String,
    pub answer: Option<String>,
    pub is_correct: bool,
    pub submitted_at: String,
}

impl SessionAnswerDbModel {
    pub fn new(
        session_id: impl Into<String>,
        question_id: impl Into<String>,
        player_id: impl Into<String>,
        answer: Option<String>,
        is_correct: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            question_id: question_id.into(),
            player_id: player_id.into(),
            answer,
            is_correct,
            submitted_at: now_rfc3339(),
        }
    }
}

/// Session snapshot database model.
///
/// Written on every stage transition; only the newest is consulted on
/// resume.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionSnapshotDbModel {
    pub id: String,
    pub session_id: String,
    pub current_index: i64,
    pub current_entry_kind: Option<String>,
    pub quiz_id: Option<String>,
    pub question_id: Option<String>,
    pub active_quiz_index: Option<i64>,
    pub active_question_index: Option<i64>,
    pub current_start: Option<String>,
    pub current_end: Option<String>,
    pub created_at: String,
}

impl SessionSnapshotDbModel {
    pub fn new(session_id: impl Into<String>, current_index: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            current_index,
            current_entry_kind: None,
            quiz_id: None,
            question_id: None,
            active_quiz_index: None,
            active_question_index: None,
            current_start: None,
            current_end: None,
            created_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new_is_draft() {
        let session = SessionDbModel::new("Friday trivia");
        assert_eq!(session.status_kind(), Some(SessionStatus::Draft));
        assert!(session.auto_advance);
        assert!(!session.manual_override);
        assert!(session.started_at.is_none());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(SessionStatus::Live.as_str(), "live");
        assert_eq!(SessionStatus::parse("finished"), Some(SessionStatus::Finished));
        assert_eq!(SessionStatus::parse("archived"), None);
    }

    #[test]
    fn test_player_starts_at_zero() {
        let player = SessionPlayerDbModel::new("abc12345", "session-1", "Alice");
        assert_eq!(player.score, 0.0);
        assert!(!player.connected);
    }
}
