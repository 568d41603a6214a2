use sqlx::Row;
use srs_core::model::{DeckId, SessionSummary};
use tracing::debug;

use super::{
    SqliteRepository,
    mapping::{from_json, i64_from_u64, ser, to_json},
};
use crate::repository::{SessionSummaryRepository, StorageError};

fn insert_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

#[async_trait::async_trait]
impl SessionSummaryRepository for SqliteRepository {
    async fn append_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO session_summaries (
                    session_id, user_id, deck_id, started_at, ended_at,
                    cards_reviewed, accuracy, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(i64_from_u64("user_id", summary.user_id().value())?)
        .bind(i64_from_u64("deck_id", summary.deck_id().value())?)
        .bind(summary.started_at())
        .bind(summary.ended_at())
        .bind(i64::from(summary.cards_reviewed()))
        .bind(summary.accuracy())
        .bind(to_json(summary)?)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;

        let id = res.last_insert_rowid();
        debug!(id, session_id = %summary.session_id(), "summary appended");
        Ok(id)
    }

    async fn list_summaries(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT payload
                FROM session_summaries
                WHERE user_id = ?1 AND deck_id = ?2
                ORDER BY ended_at DESC, id DESC
                LIMIT ?3
            ",
        )
        .bind(self.user_key()?)
        .bind(i64_from_u64("deck_id", deck_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.try_get("payload").map_err(ser)?;
            out.push(from_json(&payload)?);
        }
        Ok(out)
    }
}
