use std::collections::HashMap;

use srs_core::model::{CardId, SchedulingState};

use super::{
    SqliteRepository,
    mapping::{conn, i64_from_u64, map_state_row},
};
use crate::repository::{SchedulingStore, StorageError};

// Keeps each IN (...) list well below SQLite's bound-parameter limit.
const STATE_BATCH: usize = 500;

#[async_trait::async_trait]
impl SchedulingStore for SqliteRepository {
    async fn get_state(&self, card_id: CardId) -> Result<Option<SchedulingState>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT card_id, card_state, ease_factor, interval_days, repetitions, lapses,
                   due_at, last_reviewed_at
            FROM scheduling_states
            WHERE user_id = ?1 AND card_id = ?2
            ",
        )
        .bind(self.user_key()?)
        .bind(i64_from_u64("card_id", card_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref()
            .map(map_state_row)
            .transpose()
            .map(|found| found.map(|(_, state)| state))
    }

    async fn set_state(
        &self,
        card_id: CardId,
        state: &SchedulingState,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO scheduling_states (
                user_id, card_id, card_state, ease_factor, interval_days, repetitions,
                lapses, due_at, last_reviewed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, card_id) DO UPDATE SET
                card_state = excluded.card_state,
                ease_factor = excluded.ease_factor,
                interval_days = excluded.interval_days,
                repetitions = excluded.repetitions,
                lapses = excluded.lapses,
                due_at = excluded.due_at,
                last_reviewed_at = excluded.last_reviewed_at
            ",
        )
        .bind(self.user_key()?)
        .bind(i64_from_u64("card_id", card_id.value())?)
        .bind(state.card_state.as_str())
        .bind(state.ease_factor)
        .bind(i64::from(state.interval_days))
        .bind(i64::from(state.repetitions))
        .bind(i64::from(state.lapses))
        .bind(state.due_at)
        .bind(state.last_reviewed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn states_for(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, SchedulingState>, StorageError> {
        let user = self.user_key()?;
        let mut out = HashMap::with_capacity(card_ids.len());

        for batch in card_ids.chunks(STATE_BATCH) {
            let mut sql = String::from(
                r"
                SELECT card_id, card_state, ease_factor, interval_days, repetitions, lapses,
                       due_at, last_reviewed_at
                FROM scheduling_states
                WHERE user_id = ?1 AND card_id IN (
                ",
            );
            for i in 0..batch.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                sql.push_str(&(i + 2).to_string());
            }
            sql.push(')');

            let mut query = sqlx::query(&sql).bind(user);
            for id in batch {
                query = query.bind(i64_from_u64("card_id", id.value())?);
            }

            let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
            for row in rows {
                let (card_id, state) = map_state_row(&row)?;
                out.insert(card_id, state);
            }
        }

        Ok(out)
    }
}
