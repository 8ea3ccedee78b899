//! Quiz and question database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{decode_string_list, encode_string_list};

/// How a question expects its answer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    MultipleChoice,
    Text,
    Numeric,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::Text => "text",
            Self::Numeric => "numeric",
        }
    }

    /// Parse a stored value. Unknown values return `None`; scoring falls
    /// back to the reserved non-null-answer rule for those.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multiple_choice" => Some(Self::MultipleChoice),
            "text" => Some(Self::Text),
            "numeric" => Some(Self::Numeric),
            _ => None,
        }
    }
}

/// How a question's answers are scored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScoringType {
    Exact,
    Closest,
}

impl ScoringType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Closest => "closest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "closest" => Some(Self::Closest),
            _ => None,
        }
    }
}

/// Quiz database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizDbModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_question_duration: i64,
    pub gap_seconds: i64,
}

impl QuizDbModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            default_question_duration: 30,
            gap_seconds: 3,
        }
    }
}

/// Question database model.
///
/// `images`, `audio` and `options` are JSON arrays stored as TEXT.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionDbModel {
    pub id: String,
    pub quiz_id: String,
    pub text: Option<String>,
    pub images: String,
    pub audio: String,
    pub answer_type: String,
    pub options: String,
    pub correct_answer: Option<String>,
    /// NULL on rows written before scoring types existed; treated as the
    /// legacy closest pathway for numeric questions.
    pub scoring_type: Option<String>,
    pub duration_seconds: i64,
    pub position: i64,
    /// Reserved; surfaced in state payloads but never consulted by scoring.
    pub speed_bonus: bool,
}

impl QuestionDbModel {
    pub fn new(quiz_id: impl Into<String>, answer_type: AnswerType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz_id.into(),
            text: None,
            images: "[]".to_string(),
            audio: "[]".to_string(),
            answer_type: answer_type.as_str().to_string(),
            options: "[]".to_string(),
            correct_answer: None,
            scoring_type: Some(ScoringType::Exact.as_str().to_string()),
            duration_seconds: 30,
            position: 0,
            speed_bonus: false,
        }
    }

    pub fn image_urls(&self) -> Vec<String> {
        decode_string_list(&self.images)
    }

    pub fn audio_urls(&self) -> Vec<String> {
        decode_string_list(&self.audio)
    }

    pub fn option_list(&self) -> Vec<String> {
        decode_string_list(&self.options)
    }

    pub fn set_image_urls(&mut self, urls: &[String]) {
        self.images = encode_string_list(urls);
    }

    pub fn set_audio_urls(&mut self, urls: &[String]) {
        self.audio = encode_string_list(urls);
    }

    pub fn set_option_list(&mut self, options: &[String]) {
        self.options = encode_string_list(options);
    }

    pub fn answer_kind(&self) -> Option<AnswerType> {
        AnswerType::parse(&self.answer_type)
    }

    pub fn scoring_kind(&self) -> Option<ScoringType> {
        self.scoring_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(ScoringType::parse)
    }

    /// Whether this question's scores are deferred to finalization.
    ///
    /// Explicit `closest`, or the legacy pathway: a numeric question with
    /// no stored scoring type.
    pub fn is_closest_scored(&self) -> bool {
        match self.scoring_kind() {
            Some(ScoringType::Closest) => true,
            Some(ScoringType::Exact) => false,
            None => self.answer_kind() == Some(AnswerType::Numeric),
        }
    }
}
