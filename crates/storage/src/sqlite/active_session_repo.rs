use chrono::Utc;
use sqlx::Row;
use srs_core::model::ReviewSession;
use tracing::debug;

use super::{
    SqliteRepository,
    mapping::{conn, from_json, i64_from_u64, ser, to_json},
};
use crate::repository::{ActiveSessionStore, StorageError};

#[async_trait::async_trait]
impl ActiveSessionStore for SqliteRepository {
    async fn load_active(&self) -> Result<Option<ReviewSession>, StorageError> {
        let row = sqlx::query("SELECT payload FROM active_sessions WHERE user_id = ?1")
            .bind(self.user_key()?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload").map_err(ser)?;
                Ok(Some(from_json(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn save_active(&self, session: &ReviewSession) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO active_sessions (user_id, session_id, deck_id, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                session_id = excluded.session_id,
                deck_id = excluded.deck_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(self.user_key()?)
        .bind(session.id().to_string())
        .bind(i64_from_u64("deck_id", session.deck_id().value())?)
        .bind(to_json(session)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        debug!(session_id = %session.id(), user_id = %self.user_id, "active session saved");
        Ok(())
    }

    async fn clear_active(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM active_sessions WHERE user_id = ?1")
            .bind(self.user_key()?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
