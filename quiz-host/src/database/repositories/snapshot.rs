//! Session snapshot repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::SessionSnapshotDbModel;
use crate::Result;

/// Snapshot repository trait.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Append a snapshot; history is never rewritten.
    async fn insert_snapshot(&self, snapshot: &SessionSnapshotDbModel) -> Result<()>;
    /// Newest snapshot for a session, if any.
    async fn latest_for_session(&self, session_id: &str)
    -> Result<Option<SessionSnapshotDbModel>>;
    async fn delete_for_session(&self, session_id: &str) -> Result<()>;
}

/// SQLx implementation of SnapshotRepository.
pub struct SqlxSnapshotRepository {
    pool: SqlitePool,
}

impl SqlxSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for SqlxSnapshotRepository {
    async fn insert_snapshot(&self, snapshot: &SessionSnapshotDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_snapshots
                (id, session_id, current_index, current_entry_kind, quiz_id, question_id,
                 active_quiz_index, active_question_index, current_start, current_end, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.session_id)
        .bind(snapshot.current_index)
        .bind(&snapshot.current_entry_kind)
        .bind(&snapshot.quiz_id)
        .bind(&snapshot.question_id)
        .bind(snapshot.active_quiz_index)
        .bind(snapshot.active_question_index)
        .bind(&snapshot.current_start)
        .bind(&snapshot.current_end)
        .bind(&snapshot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSnapshotDbModel>> {
        // created_at has millisecond precision; rowid breaks ties between
        // snapshots written in the same instant.
        let snapshot = sqlx::query_as::<_, SessionSnapshotDbModel>(
            r#"
            SELECT * FROM session_snapshots
            WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snapshot)
    }

    async fn delete_for_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_snapshots WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
