//! Session player repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::SessionPlayerDbModel;
use crate::Result;

/// Player repository trait.
#[async_trait]
pub trait PlayerRepository: Send + Sync {
    async fn get_player(&self, id: &str) -> Result<Option<SessionPlayerDbModel>>;
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionPlayerDbModel>>;
    /// Insert or update the full player row (registration path).
    async fn upsert_player(&self, player: &SessionPlayerDbModel) -> Result<()>;
    async fn set_connected(&self, id: &str, connected: bool, updated_at: &str) -> Result<()>;
    async fn set_score(&self, id: &str, score: f64, updated_at: &str) -> Result<()>;
    /// Atomic score increment, used by closest finalization.
    async fn add_score(&self, id: &str, delta: f64, updated_at: &str) -> Result<()>;
    async fn delete_for_session(&self, session_id: &str) -> Result<()>;
}

/// SQLx implementation of PlayerRepository.
pub struct SqlxPlayerRepository {
    pool: SqlitePool,
}

impl SqlxPlayerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerRepository for SqlxPlayerRepository {
    async fn get_player(&self, id: &str) -> Result<Option<SessionPlayerDbModel>> {
        let player =
            sqlx::query_as::<_, SessionPlayerDbModel>("SELECT * FROM session_players WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(player)
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionPlayerDbModel>> {
        let players = sqlx::query_as::<_, SessionPlayerDbModel>(
            "SELECT * FROM session_players WHERE session_id = ? ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(players)
    }

    async fn upsert_player(&self, player: &SessionPlayerDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_players (id, session_id, name, score, connected, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE
            SET name = excluded.name, score = excluded.score,
                connected = excluded.connected, updated_at = excluded.updated_at
            "#,
        )
        .bind(&player.id)
        .bind(&player.session_id)
        .bind(&player.name)
        .bind(player.score)
        .bind(player.connected)
        .bind(&player.created_at)
        .bind(&player.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_connected(&self, id: &str, connected: bool, updated_at: &str) -> Result<()> {
        sqlx::query("UPDATE session_players SET connected = ?, updated_at = ? WHERE id = ?")
            .bind(connected)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_score(&self, id: &str, score: f64, updated_at: &str) -> Result<()> {
        sqlx::query("UPDATE session_players SET score = ?, updated_at = ? WHERE id = ?")
            .bind(score)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_score(&self, id: &str, delta: f64, updated_at: &str) -> Result<()> {
        sqlx::query("UPDATE session_players SET score = score + ?, updated_at = ? WHERE id = ?")
            .bind(delta)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_players WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
