use srs_core::model::{DeckId, DeckProgress};

use super::{
    SqliteRepository,
    mapping::{conn, i64_from_u64, map_progress_row},
};
use crate::repository::{DeckProgressStore, StorageError};

#[async_trait::async_trait]
impl DeckProgressStore for SqliteRepository {
    async fn get_progress(&self, deck_id: DeckId) -> Result<Option<DeckProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT cards_new, cards_learning, cards_review, cards_mastered, due_today,
                   streak, longest_streak, last_studied_at, sessions_completed,
                   total_time_secs, total_reviews, correct_reviews
            FROM deck_progress
            WHERE user_id = ?1 AND deck_id = ?2
            ",
        )
        .bind(self.user_key()?)
        .bind(i64_from_u64("deck_id", deck_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn set_progress(
        &self,
        deck_id: DeckId,
        progress: &DeckProgress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO deck_progress (
                user_id, deck_id, cards_new, cards_learning, cards_review, cards_mastered,
                due_today, streak, longest_streak, last_studied_at, sessions_completed,
                total_time_secs, total_reviews, correct_reviews
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(user_id, deck_id) DO UPDATE SET
                cards_new = excluded.cards_new,
                cards_learning = excluded.cards_learning,
                cards_review = excluded.cards_review,
                cards_mastered = excluded.cards_mastered,
                due_today = excluded.due_today,
                streak = excluded.streak,
                longest_streak = excluded.longest_streak,
                last_studied_at = excluded.last_studied_at,
                sessions_completed = excluded.sessions_completed,
                total_time_secs = excluded.total_time_secs,
                total_reviews = excluded.total_reviews,
                correct_reviews = excluded.correct_reviews
            ",
        )
        .bind(self.user_key()?)
        .bind(i64_from_u64("deck_id", deck_id.value())?)
        .bind(i64::from(progress.cards_new))
        .bind(i64::from(progress.cards_learning))
        .bind(i64::from(progress.cards_review))
        .bind(i64::from(progress.cards_mastered))
        .bind(i64::from(progress.due_today))
        .bind(i64::from(progress.streak))
        .bind(i64::from(progress.longest_streak))
        .bind(progress.last_studied_at)
        .bind(i64::from(progress.sessions_completed))
        .bind(i64_from_u64("total_time_secs", progress.total_time_secs)?)
        .bind(i64_from_u64("total_reviews", progress.total_reviews)?)
        .bind(i64_from_u64("correct_reviews", progress.correct_reviews)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
