//! Session repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{SessionDbModel, SessionQuizDbModel, SessionStatus};
use crate::{Error, Result};

/// Session repository trait.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(
        &self,
        session: &SessionDbModel,
        links: &[SessionQuizDbModel],
    ) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<SessionDbModel>;
    async fn list_sessions(&self) -> Result<Vec<SessionDbModel>>;
    /// Playlist links ordered by position.
    async fn quiz_links(&self, session_id: &str) -> Result<Vec<SessionQuizDbModel>>;

    /// Mark live and record the start timestamp.
    async fn mark_live(&self, id: &str, started_at: &str) -> Result<()>;
    /// Mark finished, record the finish timestamp and clear active indices.
    async fn mark_finished(&self, id: &str, finished_at: &str) -> Result<()>;
    async fn set_active_indices(
        &self,
        id: &str,
        quiz_index: Option<i64>,
        question_index: Option<i64>,
    ) -> Result<()>;
    async fn set_manual_override(&self, id: &str, manual: bool) -> Result<()>;
    /// Resume path: set live and restore indices from a snapshot.
    async fn restore_live(
        &self,
        id: &str,
        quiz_index: Option<i64>,
        question_index: Option<i64>,
    ) -> Result<()>;
    /// Back to draft: clear override, indices and timestamps.
    async fn reset_session(&self, id: &str) -> Result<()>;
    async fn delete_session(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of SessionRepository.
pub struct SqlxSessionRepository {
    pool: SqlitePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create_session(
        &self,
        session: &SessionDbModel,
        links: &[SessionQuizDbModel],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, name, status, auto_advance, manual_override,
                 active_quiz_index, active_question_index, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.name)
        .bind(&session.status)
        .bind(session.auto_advance)
        .bind(session.manual_override)
        .bind(session.active_quiz_index)
        .bind(session.active_question_index)
        .bind(&session.started_at)
        .bind(&session.finished_at)
        .execute(&self.pool)
        .await?;

        for link in links {
            sqlx::query(
                "INSERT INTO session_quizzes (id, session_id, quiz_id, position) VALUES (?, ?, ?, ?)",
            )
            .bind(&link.id)
            .bind(&link.session_id)
            .bind(&link.quiz_id)
            .bind(link.position)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<SessionDbModel> {
        sqlx::query_as::<_, SessionDbModel>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Session", id))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionDbModel>> {
        let sessions = sqlx::query_as::<_, SessionDbModel>("SELECT * FROM sessions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    async fn quiz_links(&self, session_id: &str) -> Result<Vec<SessionQuizDbModel>> {
        let links = sqlx::query_as::<_, SessionQuizDbModel>(
            "SELECT * FROM session_quizzes WHERE session_id = ? ORDER BY position",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn mark_live(&self, id: &str, started_at: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = ?, started_at = ?, finished_at = NULL WHERE id = ?")
            .bind(SessionStatus::Live.as_str())
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_finished(&self, id: &str, finished_at: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, finished_at = ?, active_quiz_index = NULL, active_question_index = NULL
            WHERE id = ?
            "#,
        )
        .bind(SessionStatus::Finished.as_str())
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_active_indices(
        &self,
        id: &str,
        quiz_index: Option<i64>,
        question_index: Option<i64>,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET active_quiz_index = ?, active_question_index = ? WHERE id = ?")
            .bind(quiz_index)
            .bind(question_index)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_manual_override(&self, id: &str, manual: bool) -> Result<()> {
        sqlx::query("UPDATE sessions SET manual_override = ? WHERE id = ?")
            .bind(manual)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn restore_live(
        &self,
        id: &str,
        quiz_index: Option<i64>,
        question_index: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, active_quiz_index = ?, active_question_index = ?, finished_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(SessionStatus::Live.as_str())
        .bind(quiz_index)
        .bind(question_index)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_session(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, manual_override = 0, active_quiz_index = NULL,
                active_question_index = NULL, started_at = NULL, finished_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(SessionStatus::Draft.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_quizzes WHERE session_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
