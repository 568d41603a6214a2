use serde::{Deserialize, Serialize};

use crate::model::{
    content::Content,
    ids::{CardId, DeckId},
};

//
// ─── CARD ──────────────────────────────────────────────────────────────────────
//

/// A catalog card as served by the deck service.
///
/// The review engine never mutates cards; per-learner scheduling lives in
/// `SchedulingState`, keyed by the card id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: CardId,
    deck_id: DeckId,
    front: Content,
    back: Content,
    position: u32,
}

impl Card {
    #[must_use]
    pub fn new(id: CardId, deck_id: DeckId, front: Content, back: Content, position: u32) -> Self {
        Self {
            id,
            deck_id,
            front,
            back,
            position,
        }
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn front(&self) -> &Content {
        &self.front
    }

    #[must_use]
    pub fn back(&self) -> &Content {
        &self.back
    }

    /// Position of the card in its deck; the queue builder uses deck order to break ties.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_accessors() {
        let card = Card::new(
            CardId::new(3),
            DeckId::new(1),
            Content::text("el perro").unwrap(),
            Content::image("https://x.test/dog.png", Some("dog".into())).unwrap(),
            2,
        );

        assert_eq!(card.id(), CardId::new(3));
        assert_eq!(card.deck_id(), DeckId::new(1));
        assert_eq!(card.front().label(), "el perro");
        assert_eq!(card.back().label(), "dog");
        assert_eq!(card.position(), 2);
    }
}
