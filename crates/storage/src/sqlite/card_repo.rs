use srs_core::model::{Card, DeckId};

use super::{
    SqliteRepository,
    mapping::{conn, i64_from_u64, map_card_row, to_json},
};
use crate::repository::{CardCatalog, StorageError};

#[async_trait::async_trait]
impl CardCatalog for SqliteRepository {
    async fn cards_for_deck(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, deck_id, position, front, back
            FROM cards
            WHERE deck_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(i64_from_u64("deck_id", deck_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            cards.push(map_card_row(&row)?);
        }
        Ok(cards)
    }

    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO cards (id, deck_id, position, front, back)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                deck_id = excluded.deck_id,
                position = excluded.position,
                front = excluded.front,
                back = excluded.back
            ",
        )
        .bind(i64_from_u64("card_id", card.id().value())?)
        .bind(i64_from_u64("deck_id", card.deck_id().value())?)
        .bind(i64::from(card.position()))
        .bind(to_json(card.front())?)
        .bind(to_json(card.back())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
