use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::scheduling::CardState;

/// Counter bucket a card state is reported under.
///
/// Relearning cards are counted as learning: they are back in short steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressBucket {
    New,
    Learning,
    Review,
    Mastered,
}

impl ProgressBucket {
    pub const ALL: [ProgressBucket; 4] = [
        ProgressBucket::New,
        ProgressBucket::Learning,
        ProgressBucket::Review,
        ProgressBucket::Mastered,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            ProgressBucket::New => 0,
            ProgressBucket::Learning => 1,
            ProgressBucket::Review => 2,
            ProgressBucket::Mastered => 3,
        }
    }
}

impl From<CardState> for ProgressBucket {
    fn from(state: CardState) -> Self {
        match state {
            CardState::New => ProgressBucket::New,
            CardState::Learning | CardState::Relearning => ProgressBucket::Learning,
            CardState::Review => ProgressBucket::Review,
            CardState::Mastered => ProgressBucket::Mastered,
        }
    }
}

/// Cumulative per-learner, per-deck counters.
///
/// Only the session aggregator mutates these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckProgress {
    pub cards_new: u32,
    pub cards_learning: u32,
    pub cards_review: u32,
    pub cards_mastered: u32,
    pub due_today: u32,
    pub streak: u32,
    pub longest_streak: u32,
    pub last_studied_at: Option<DateTime<Utc>>,
    pub sessions_completed: u32,
    pub total_time_secs: u64,
    pub total_reviews: u64,
    pub correct_reviews: u64,
}

impl DeckProgress {
    /// Builds the state counters from the current state of every card in a deck.
    pub fn from_states(states: impl IntoIterator<Item = CardState>) -> Self {
        let mut progress = Self::default();
        for state in states {
            let slot = progress.bucket_mut(ProgressBucket::from(state));
            *slot = slot.saturating_add(1);
        }
        progress
    }

    #[must_use]
    pub fn bucket(&self, bucket: ProgressBucket) -> u32 {
        match bucket {
            ProgressBucket::New => self.cards_new,
            ProgressBucket::Learning => self.cards_learning,
            ProgressBucket::Review => self.cards_review,
            ProgressBucket::Mastered => self.cards_mastered,
        }
    }

    pub fn bucket_mut(&mut self, bucket: ProgressBucket) -> &mut u32 {
        match bucket {
            ProgressBucket::New => &mut self.cards_new,
            ProgressBucket::Learning => &mut self.cards_learning,
            ProgressBucket::Review => &mut self.cards_review,
            ProgressBucket::Mastered => &mut self.cards_mastered,
        }
    }

    /// Sum of the four state counters.
    #[must_use]
    pub fn total_cards(&self) -> u64 {
        ProgressBucket::ALL
            .iter()
            .map(|b| u64::from(self.bucket(*b)))
            .sum()
    }

    /// Lifetime accuracy for the deck in `0.0..=1.0`; zero before any review.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.total_reviews == 0 {
            return 0.0;
        }
        self.correct_reviews as f64 / self.total_reviews as f64
    }
}
