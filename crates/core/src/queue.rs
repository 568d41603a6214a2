use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Card, CardId, CardState, QueuedCard, ReviewSettings, SchedulingState};

/// Caps applied while building a session queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_cards: u32,
    pub max_new_cards: u32,
    pub max_review_cards: u32,
}

impl QueueLimits {
    #[must_use]
    pub fn new(max_cards: u32, max_new_cards: u32, max_review_cards: u32) -> Self {
        Self {
            max_cards,
            max_new_cards,
            max_review_cards,
        }
    }
}

impl From<&ReviewSettings> for QueueLimits {
    fn from(settings: &ReviewSettings) -> Self {
        Self::new(
            settings.max_cards(),
            settings.max_new_cards(),
            settings.max_review_cards(),
        )
    }
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from(&ReviewSettings::default())
    }
}

/// Selects and orders the due cards of a deck.
///
/// Order: cards in short steps (learning, relearning), then unseen cards,
/// then reviews. Within a group the deck order is kept.
pub struct QueueBuilder;

impl QueueBuilder {
    /// Build the queue for a session.
    ///
    /// `cards` is expected in deck order. Cards with no entry in `states` are
    /// treated as new and due at `now`. Pure: identical inputs give identical
    /// output.
    #[must_use]
    pub fn build(
        cards: &[Card],
        states: &HashMap<CardId, SchedulingState>,
        now: DateTime<Utc>,
        limits: QueueLimits,
    ) -> Vec<QueuedCard> {
        let mut due: Vec<QueuedCard> = cards
            .iter()
            .map(|card| {
                let state = states
                    .get(&card.id())
                    .cloned()
                    .unwrap_or_else(|| SchedulingState::new_card(now));
                QueuedCard::new(card.id(), state)
            })
            .filter(|queued| queued.state.is_due(now))
            .collect();

        // stable: ties keep deck order
        due.sort_by_key(|queued| queued.state.card_state.queue_priority());

        let mut new_taken = 0_u32;
        let mut review_taken = 0_u32;
        due.into_iter()
            .filter(|queued| match queued.state.card_state {
                CardState::New => take(&mut new_taken, limits.max_new_cards),
                CardState::Review | CardState::Mastered => {
                    take(&mut review_taken, limits.max_review_cards)
                }
                CardState::Learning | CardState::Relearning => true,
            })
            .take(usize::try_from(limits.max_cards).unwrap_or(usize::MAX))
            .collect()
    }

    /// Number of cards in the deck due at `now`, ignoring session limits.
    #[must_use]
    pub fn due_count(
        cards: &[Card],
        states: &HashMap<CardId, SchedulingState>,
        now: DateTime<Utc>,
    ) -> u32 {
        let count = cards
            .iter()
            .filter(|card| states.get(&card.id()).is_none_or(|s| s.is_due(now)))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn take(taken: &mut u32, cap: u32) -> bool {
    if *taken < cap {
        *taken += 1;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Content, DeckId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn card(id: u64) -> Card {
        Card::new(
            CardId::new(id),
            DeckId::new(1),
            Content::text(format!("front {id}")).unwrap(),
            Content::text(format!("back {id}")).unwrap(),
            u32::try_from(id).unwrap(),
        )
    }

    fn state(card_state: CardState, due_in_days: i64) -> SchedulingState {
        SchedulingState {
            card_state,
            interval_days: 1,
            repetitions: 1,
            due_at: fixed_now() + Duration::days(due_in_days),
            ..SchedulingState::new_card(fixed_now())
        }
    }

    fn ids(queue: &[QueuedCard]) -> Vec<u64> {
        queue.iter().map(|q| q.card_id.value()).collect()
    }

    #[test]
    fn learning_then_new_then_review() {
        // deck order: review(1), new(2), learning(3), new(4)
        let cards: Vec<Card> = (1..=4).map(card).collect();
        let states = HashMap::from([
            (CardId::new(1), state(CardState::Review, 0)),
            (CardId::new(3), state(CardState::Learning, -1)),
        ]);

        let queue = QueueBuilder::build(&cards, &states, fixed_now(), QueueLimits::new(3, 10, 10));
        assert_eq!(ids(&queue), vec![3, 2, 4]);
        assert_eq!(queue[0].state.card_state, CardState::Learning);
        assert_eq!(queue[1].state.card_state, CardState::New);
        assert_eq!(queue[2].state.card_state, CardState::New);
    }

    #[test]
    fn not_yet_due_cards_are_skipped() {
        let cards: Vec<Card> = (1..=2).map(card).collect();
        let states = HashMap::from([
            (CardId::new(1), state(CardState::Review, 2)),
            (CardId::new(2), state(CardState::Relearning, 0)),
        ]);
        let queue = QueueBuilder::build(&cards, &states, fixed_now(), QueueLimits::default());
        assert_eq!(ids(&queue), vec![2]);
        assert_eq!(QueueBuilder::due_count(&cards, &states, fixed_now()), 1);
        assert_eq!(
            QueueBuilder::due_count(&cards, &states, fixed_now() + Duration::days(2)),
            2
        );
    }

    #[test]
    fn new_and_review_caps_apply_before_total() {
        let cards: Vec<Card> = (1..=6).map(card).collect();
        let states = HashMap::from([
            (CardId::new(1), state(CardState::Review, -3)),
            (CardId::new(2), state(CardState::Mastered, -1)),
            (CardId::new(3), state(CardState::Learning, 0)),
        ]);

        let queue = QueueBuilder::build(&cards, &states, fixed_now(), QueueLimits::new(10, 2, 1));
        assert_eq!(ids(&queue), vec![3, 4, 5, 1]);

        let reviews_only =
            QueueBuilder::build(&cards, &states, fixed_now(), QueueLimits::new(10, 0, 10));
        assert_eq!(ids(&reviews_only), vec![3, 1, 2]);
    }

    #[test]
    fn learning_cards_ignore_new_and_review_caps() {
        let cards: Vec<Card> = (1..=3).map(card).collect();
        let states: HashMap<_, _> = (1..=3)
            .map(|id| (CardId::new(id), state(CardState::Learning, 0)))
            .collect();
        let queue = QueueBuilder::build(&cards, &states, fixed_now(), QueueLimits::new(2, 0, 0));
        assert_eq!(ids(&queue), vec![1, 2]);
    }

    #[test]
    fn missing_states_default_to_new_due_now() {
        let cards = vec![card(7)];
        let queue = QueueBuilder::build(&cards, &HashMap::new(), fixed_now(), QueueLimits::default());
        assert_eq!(queue, vec![QueuedCard::new(CardId::new(7), SchedulingState::new_card(fixed_now()))]);
    }

    #[test]
    fn build_is_idempotent() {
        let cards: Vec<Card> = (1..=8).map(card).collect();
        let states = HashMap::from([
            (CardId::new(2), state(CardState::Review, -2)),
            (CardId::new(5), state(CardState::Relearning, 0)),
            (CardId::new(6), state(CardState::Review, 4)),
        ]);
        let limits = QueueLimits::new(5, 3, 3);
        let first = QueueBuilder::build(&cards, &states, fixed_now(), limits);
        let second = QueueBuilder::build(&cards, &states, fixed_now(), limits);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_deck_gives_empty_queue() {
        assert!(QueueBuilder::build(&[], &HashMap::new(), fixed_now(), QueueLimits::default()).is_empty());
    }
}
