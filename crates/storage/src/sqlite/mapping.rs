use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{Row, sqlite::SqliteRow};
use srs_core::model::{Card, CardId, CardState, Content, DeckId, DeckProgress, SchedulingState};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u32_col(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn u64_col(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    u64_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn card_id_from_i64(v: i64) -> Result<CardId, StorageError> {
    Ok(CardId::new(u64_from_i64("card_id", v)?))
}

pub(crate) fn deck_id_from_i64(v: i64) -> Result<DeckId, StorageError> {
    Ok(DeckId::new(u64_from_i64("deck_id", v)?))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn parse_card_state(s: &str) -> Result<CardState, StorageError> {
    CardState::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid card state: {s}")))
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let front: Content = from_json(&row.try_get::<String, _>("front").map_err(ser)?)?;
    let back: Content = from_json(&row.try_get::<String, _>("back").map_err(ser)?)?;

    Ok(Card::new(
        card_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        deck_id_from_i64(row.try_get::<i64, _>("deck_id").map_err(ser)?)?,
        front,
        back,
        u32_col(row, "position")?,
    ))
}

pub(crate) fn map_state_row(row: &SqliteRow) -> Result<(CardId, SchedulingState), StorageError> {
    let card_id = card_id_from_i64(row.try_get::<i64, _>("card_id").map_err(ser)?)?;
    let card_state: String = row.try_get("card_state").map_err(ser)?;
    let due_at: DateTime<Utc> = row.try_get("due_at").map_err(ser)?;

    let state = SchedulingState {
        card_state: parse_card_state(&card_state)?,
        ease_factor: row.try_get("ease_factor").map_err(ser)?,
        interval_days: u32_col(row, "interval_days")?,
        repetitions: u32_col(row, "repetitions")?,
        lapses: u32_col(row, "lapses")?,
        due_at,
        last_reviewed_at: row.try_get("last_reviewed_at").map_err(ser)?,
    };
    Ok((card_id, state))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<DeckProgress, StorageError> {
    Ok(DeckProgress {
        cards_new: u32_col(row, "cards_new")?,
        cards_learning: u32_col(row, "cards_learning")?,
        cards_review: u32_col(row, "cards_review")?,
        cards_mastered: u32_col(row, "cards_mastered")?,
        due_today: u32_col(row, "due_today")?,
        streak: u32_col(row, "streak")?,
        longest_streak: u32_col(row, "longest_streak")?,
        last_studied_at: row.try_get("last_studied_at").map_err(ser)?,
        sessions_completed: u32_col(row, "sessions_completed")?,
        total_time_secs: u64_col(row, "total_time_secs")?,
        total_reviews: u64_col(row, "total_reviews")?,
        correct_reviews: u64_col(row, "correct_reviews")?,
    })
}
