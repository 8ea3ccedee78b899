//! Timeline materialization.
//!
//! A session's playlist is flattened into a linear stage sequence: each
//! quiz contributes an intro stage followed by one stage per question.

use std::sync::Arc;

use crate::database::models::{QuestionDbModel, QuizDbModel};
use crate::database::repositories::{QuizRepository, SessionRepository};
use crate::{Error, Result};

/// One stage of a materialized session timeline.
#[derive(Debug, Clone)]
pub enum TimelineEntry {
    QuizIntro {
        quiz_index: usize,
        quiz: Arc<QuizDbModel>,
        questions: Vec<Arc<QuestionDbModel>>,
    },
    Question {
        quiz_index: usize,
        question_index: usize,
        duration_seconds: i64,
        gap_seconds: i64,
        question: Arc<QuestionDbModel>,
    },
}

impl TimelineEntry {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::QuizIntro { .. } => "quiz_intro",
            Self::Question { .. } => "question",
        }
    }

    pub fn is_question(&self) -> bool {
        matches!(self, Self::Question { .. })
    }

    pub fn quiz_index(&self) -> usize {
        match self {
            Self::QuizIntro { quiz_index, .. } | Self::Question { quiz_index, .. } => *quiz_index,
        }
    }

    pub fn question_index(&self) -> Option<usize> {
        match self {
            Self::QuizIntro { .. } => None,
            Self::Question { question_index, .. } => Some(*question_index),
        }
    }

    pub fn question(&self) -> Option<&Arc<QuestionDbModel>> {
        match self {
            Self::QuizIntro { .. } => None,
            Self::Question { question, .. } => Some(question),
        }
    }

    /// The quiz carried by an intro stage.
    pub fn intro_quiz(&self) -> Option<&Arc<QuizDbModel>> {
        match self {
            Self::QuizIntro { quiz, .. } => Some(quiz),
            Self::Question { .. } => None,
        }
    }

    pub fn gap_seconds(&self) -> i64 {
        match self {
            Self::QuizIntro { .. } => 0,
            Self::Question { gap_seconds, .. } => *gap_seconds,
        }
    }
}

/// Materialize the stage sequence for a session.
///
/// Quizzes are visited in playlist order; questions within a quiz in
/// position order. Playlist links whose quiz has been deleted are skipped.
/// Empty quizzes contribute only their intro.
pub async fn build_timeline(
    session_id: &str,
    sessions: &dyn SessionRepository,
    quizzes: &dyn QuizRepository,
) -> Result<Vec<Arc<TimelineEntry>>> {
    let links = sessions.quiz_links(session_id).await?;

    let mut entries: Vec<Arc<TimelineEntry>> = Vec::new();
    let mut quiz_index = 0usize;
    for link in links {
        let quiz = match quizzes.get_quiz(&link.quiz_id).await {
            Ok(quiz) => Arc::new(quiz),
            Err(Error::NotFound { .. }) => continue,
            Err(e) => return Err(e),
        };

        let mut questions = quizzes.list_questions(&quiz.id).await?;
        questions.sort_by_key(|question| question.position);
        let questions: Vec<Arc<QuestionDbModel>> = questions.into_iter().map(Arc::new).collect();

        entries.push(Arc::new(TimelineEntry::QuizIntro {
            quiz_index,
            quiz: Arc::clone(&quiz),
            questions: questions.clone(),
        }));

        for (question_index, question) in questions.into_iter().enumerate() {
            entries.push(Arc::new(TimelineEntry::Question {
                quiz_index,
                question_index,
                duration_seconds: question.duration_seconds,
                gap_seconds: quiz.gap_seconds,
                question,
            }));
        }

        quiz_index += 1;
    }

    Ok(entries)
}
