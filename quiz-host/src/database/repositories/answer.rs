//! Session answer repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::SessionAnswerDbModel;
use crate::Result;

/// Answer repository trait.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Insert an answer row. Fails on a duplicate (session, question, player).
    async fn insert_answer(&self, answer: &SessionAnswerDbModel) -> Result<()>;
    /// Answers for one question in submission order.
    async fn list_for_question(
        &self,
        session_id: &str,
        question_id: &str,
    ) -> Result<Vec<SessionAnswerDbModel>>;
    /// Patch correctness, used by closest finalization.
    async fn set_correct(
        &self,
        session_id: &str,
        question_id: &str,
        player_id: &str,
        is_correct: bool,
    ) -> Result<()>;
    async fn delete_for_session(&self, session_id: &str) -> Result<()>;
}

/// SQLx implementation of AnswerRepository.
pub struct SqlxAnswerRepository {
    pool: SqlitePool,
}

impl SqlxAnswerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerRepository for SqlxAnswerRepository {
    async fn insert_answer(&self, answer: &SessionAnswerDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_answers
                (id, session_id, question_id, player_id, answer, is_correct, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&answer.id)
        .bind(&answer.session_id)
        .bind(&answer.question_id)
        .bind(&answer.player_id)
        .bind(&answer.answer)
        .bind(answer.is_correct)
        .bind(&answer.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_question(
        &self,
        session_id: &str,
        question_id: &str,
    ) -> Result<Vec<SessionAnswerDbModel>> {
        let answers = sqlx::query_as::<_, SessionAnswerDbModel>(
            r#"
            SELECT * FROM session_answers
            WHERE session_id = ? AND question_id = ?
            ORDER BY submitted_at, rowid
            "#,
        )
        .bind(session_id)
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn set_correct(
        &self,
        session_id: &str,
        question_id: &str,
        player_id: &str,
        is_correct: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE session_answers SET is_correct = ?
            WHERE session_id = ? AND question_id = ? AND player_id = ?
            "#,
        )
        .bind(is_correct)
        .bind(session_id)
        .bind(question_id)
        .bind(player_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_for_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_answers WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
