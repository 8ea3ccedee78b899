//! Quiz and question repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{QuestionDbModel, QuizDbModel};
use crate::{Error, Result};

/// Quiz repository trait.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn create_quiz(&self, quiz: &QuizDbModel, questions: &[QuestionDbModel]) -> Result<()>;
    async fn get_quiz(&self, id: &str) -> Result<QuizDbModel>;
    async fn list_quizzes(&self) -> Result<Vec<QuizDbModel>>;

    async fn get_question(&self, id: &str) -> Result<QuestionDbModel>;
    /// Questions of a quiz ordered by position.
    async fn list_questions(&self, quiz_id: &str) -> Result<Vec<QuestionDbModel>>;
    async fn insert_question(&self, question: &QuestionDbModel) -> Result<()>;
    async fn update_question(&self, question: &QuestionDbModel) -> Result<()>;
    async fn delete_question(&self, id: &str) -> Result<()>;
    /// Rewrite question positions, used by reorder and delete re-sequencing.
    async fn set_question_positions(&self, positions: &[(String, i64)]) -> Result<()>;
}

/// SQLx implementation of QuizRepository.
pub struct SqlxQuizRepository {
    pool: SqlitePool,
}

impl SqlxQuizRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizRepository for SqlxQuizRepository {
    async fn create_quiz(&self, quiz: &QuizDbModel, questions: &[QuestionDbModel]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quizzes (id, name, description, default_question_duration, gap_seconds)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quiz.id)
        .bind(&quiz.name)
        .bind(&quiz.description)
        .bind(quiz.default_question_duration)
        .bind(quiz.gap_seconds)
        .execute(&self.pool)
        .await?;

        for question in questions {
            self.insert_question(question).await?;
        }
        Ok(())
    }

    async fn get_quiz(&self, id: &str) -> Result<QuizDbModel> {
        sqlx::query_as::<_, QuizDbModel>("SELECT * FROM quizzes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Quiz", id))
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizDbModel>> {
        let quizzes = sqlx::query_as::<_, QuizDbModel>("SELECT * FROM quizzes ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(quizzes)
    }

    async fn get_question(&self, id: &str) -> Result<QuestionDbModel> {
        sqlx::query_as::<_, QuestionDbModel>("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Question", id))
    }

    async fn list_questions(&self, quiz_id: &str) -> Result<Vec<QuestionDbModel>> {
        let questions = sqlx::query_as::<_, QuestionDbModel>(
            "SELECT * FROM questions WHERE quiz_id = ? ORDER BY position",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn insert_question(&self, question: &QuestionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO questions
                (id, quiz_id, text, images, audio, answer_type, options, correct_answer,
                 scoring_type, duration_seconds, position, speed_bonus)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.quiz_id)
        .bind(&question.text)
        .bind(&question.images)
        .bind(&question.audio)
        .bind(&question.answer_type)
        .bind(&question.options)
        .bind(&question.correct_answer)
        .bind(&question.scoring_type)
        .bind(question.duration_seconds)
        .bind(question.position)
        .bind(question.speed_bonus)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_question(&self, question: &QuestionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE questions
            SET text = ?, images = ?, audio = ?, answer_type = ?, options = ?,
                correct_answer = ?, scoring_type = ?, duration_seconds = ?,
                position = ?, speed_bonus = ?
            WHERE id = ?
            "#,
        )
        .bind(&question.text)
        .bind(&question.images)
        .bind(&question.audio)
        .bind(&question.answer_type)
        .bind(&question.options)
        .bind(&question.correct_answer)
        .bind(&question.scoring_type)
        .bind(question.duration_seconds)
        .bind(question.position)
        .bind(question.speed_bonus)
        .bind(&question.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_question(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_question_positions(&self, positions: &[(String, i64)]) -> Result<()> {
        for (id, position) in positions {
            sqlx::query("UPDATE questions SET position = ? WHERE id = ?")
                .bind(position)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
