use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::CardId;

/// Ease factor assigned to a card that has never been reviewed.
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// Lowest ease factor a card can reach.
pub const MIN_EASE_FACTOR: f64 = 1.3;

//
// ─── CARD STATE ────────────────────────────────────────────────────────────────
//

/// Lifecycle phase of a card for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
    Mastered,
}

impl CardState {
    /// True once the card has left the initial learning steps at least once.
    #[must_use]
    pub fn is_graduated(self) -> bool {
        matches!(
            self,
            CardState::Review | CardState::Relearning | CardState::Mastered
        )
    }

    /// Queue priority: lower sorts first.
    #[must_use]
    pub fn queue_priority(self) -> u8 {
        match self {
            CardState::Learning | CardState::Relearning => 0,
            CardState::New => 1,
            CardState::Review | CardState::Mastered => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Relearning => "relearning",
            CardState::Mastered => "mastered",
        }
    }

    /// Parses the storage representation produced by `as_str`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CardState::New),
            "learning" => Some(CardState::Learning),
            "review" => Some(CardState::Review),
            "relearning" => Some(CardState::Relearning),
            "mastered" => Some(CardState::Mastered),
            _ => None,
        }
    }
}

//
// ─── SCHEDULING STATE ──────────────────────────────────────────────────────────
//

/// Per-learner scheduling data for one card.
///
/// Produced by the scheduler and persisted by the caller after every rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub card_state: CardState,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub lapses: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl SchedulingState {
    /// State of a card that has never been reviewed, due immediately.
    #[must_use]
    pub fn new_card(now: DateTime<Utc>) -> Self {
        Self {
            card_state: CardState::New,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            lapses: 0,
            due_at: now,
            last_reviewed_at: None,
        }
    }

    /// A card is due when it is new or its scheduled date has arrived.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.card_state == CardState::New || self.due_at <= now
    }
}

/// A card selected into a session together with its scheduling snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCard {
    pub card_id: CardId,
    pub state: SchedulingState,
}

impl QueuedCard {
    #[must_use]
    pub fn new(card_id: CardId, state: SchedulingState) -> Self {
        Self { card_id, state }
    }
}
