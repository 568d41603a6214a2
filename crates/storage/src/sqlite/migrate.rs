use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

/// Runs the versioned migrations that have not been applied yet.
///
/// Version 1 creates the catalog, per-learner scheduling state, the
/// active-session slot, deck progress and the session summary log.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY,
                    deck_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    front TEXT NOT NULL,
                    back TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS scheduling_states (
                    user_id INTEGER NOT NULL,
                    card_id INTEGER NOT NULL,
                    card_state TEXT NOT NULL,
                    ease_factor REAL NOT NULL,
                    interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
                    repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
                    lapses INTEGER NOT NULL CHECK (lapses >= 0),
                    due_at TEXT NOT NULL,
                    last_reviewed_at TEXT,
                    PRIMARY KEY (user_id, card_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS active_sessions (
                    user_id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    deck_id INTEGER NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS deck_progress (
                    user_id INTEGER NOT NULL,
                    deck_id INTEGER NOT NULL,
                    cards_new INTEGER NOT NULL CHECK (cards_new >= 0),
                    cards_learning INTEGER NOT NULL CHECK (cards_learning >= 0),
                    cards_review INTEGER NOT NULL CHECK (cards_review >= 0),
                    cards_mastered INTEGER NOT NULL CHECK (cards_mastered >= 0),
                    due_today INTEGER NOT NULL CHECK (due_today >= 0),
                    streak INTEGER NOT NULL CHECK (streak >= 0),
                    longest_streak INTEGER NOT NULL CHECK (longest_streak >= 0),
                    last_studied_at TEXT,
                    sessions_completed INTEGER NOT NULL CHECK (sessions_completed >= 0),
                    total_time_secs INTEGER NOT NULL CHECK (total_time_secs >= 0),
                    total_reviews INTEGER NOT NULL CHECK (total_reviews >= 0),
                    correct_reviews INTEGER NOT NULL CHECK (correct_reviews >= 0),
                    PRIMARY KEY (user_id, deck_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_summaries (
                    id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL,
                    deck_id INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    ended_at TEXT NOT NULL,
                    cards_reviewed INTEGER NOT NULL CHECK (cards_reviewed >= 0),
                    accuracy REAL NOT NULL CHECK (accuracy BETWEEN 0.0 AND 1.0),
                    payload TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_cards_deck_position
                    ON cards (deck_id, position, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_scheduling_states_user_due
                    ON scheduling_states (user_id, due_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_summaries_user_deck_ended
                    ON session_summaries (user_id, deck_id, ended_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = 1, "applied schema migration");
    }

    Ok(())
}
