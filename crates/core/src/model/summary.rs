use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    DeckId, SessionId, UserId,
    progress::{DeckProgress, ProgressBucket},
    review::RatingRecord,
    scheduling::CardState,
    session::RatingBreakdown,
};

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Card-state transitions observed during a session.
///
/// Counted per rating from the recorded before/after states, so a card rated
/// several times contributes a chain whose net effect equals its first
/// "before" and last "after".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCounts {
    /// `moves[from][to]` over `ProgressBucket` indices.
    moves: [[u32; 4]; 4],
    to_relearning: u32,
}

impl TransitionCounts {
    pub fn record(&mut self, before: CardState, after: CardState) {
        if before == after {
            return;
        }
        if after == CardState::Relearning {
            self.to_relearning = self.to_relearning.saturating_add(1);
        }
        let from = ProgressBucket::from(before).index();
        let to = ProgressBucket::from(after).index();
        if from != to {
            self.moves[from][to] = self.moves[from][to].saturating_add(1);
        }
    }

    #[must_use]
    pub fn between(&self, from: ProgressBucket, to: ProgressBucket) -> u32 {
        self.moves[from.index()][to.index()]
    }

    #[must_use]
    pub fn new_to_learning(&self) -> u32 {
        self.between(ProgressBucket::New, ProgressBucket::Learning)
    }

    /// New cards answered `Easy` skip the learning steps.
    #[must_use]
    pub fn new_to_review(&self) -> u32 {
        self.between(ProgressBucket::New, ProgressBucket::Review)
    }

    /// Includes relearning cards that graduated back to review.
    #[must_use]
    pub fn learning_to_review(&self) -> u32 {
        self.between(ProgressBucket::Learning, ProgressBucket::Review)
    }

    #[must_use]
    pub fn review_to_mastered(&self) -> u32 {
        self.between(ProgressBucket::Review, ProgressBucket::Mastered)
    }

    /// Lapses from review or mastered into relearning.
    #[must_use]
    pub fn to_relearning(&self) -> u32 {
        self.to_relearning
    }

    /// Total number of recorded state changes that crossed a bucket boundary.
    #[must_use]
    pub fn total_moves(&self) -> u32 {
        self.moves
            .iter()
            .flatten()
            .fold(0_u32, |acc, n| acc.saturating_add(*n))
    }

    /// Net change per bucket, indexed like `ProgressBucket::index`.
    #[must_use]
    pub fn net_deltas(&self) -> [i64; 4] {
        let mut deltas = [0_i64; 4];
        for (from, row) in self.moves.iter().enumerate() {
            for (to, count) in row.iter().enumerate() {
                deltas[from] -= i64::from(*count);
                deltas[to] += i64::from(*count);
            }
        }
        deltas
    }
}

impl<'a> FromIterator<&'a RatingRecord> for TransitionCounts {
    fn from_iter<I: IntoIterator<Item = &'a RatingRecord>>(iter: I) -> Self {
        let mut counts = Self::default();
        for record in iter {
            counts.record(record.state_before, record.state_after);
        }
        counts
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Immutable record of a finished session, produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub(crate) session_id: SessionId,
    pub(crate) user_id: UserId,
    pub(crate) deck_id: DeckId,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: DateTime<Utc>,
    pub(crate) duration_secs: u64,
    pub(crate) active_secs: u64,
    pub(crate) cards_reviewed: u32,
    pub(crate) unique_cards: u32,
    pub(crate) accuracy: f64,
    pub(crate) total_time_secs: u64,
    pub(crate) average_time_per_card_secs: f64,
    pub(crate) breakdown: RatingBreakdown,
    pub(crate) transitions: TransitionCounts,
    pub(crate) progress_before: DeckProgress,
    pub(crate) progress_after: DeckProgress,
}

impl SessionSummary {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Wall-clock length of the session.
    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Wall-clock length minus pauses.
    #[must_use]
    pub fn active_secs(&self) -> u64 {
        self.active_secs
    }

    #[must_use]
    pub fn cards_reviewed(&self) -> u32 {
        self.cards_reviewed
    }

    #[must_use]
    pub fn unique_cards(&self) -> u32 {
        self.unique_cards
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Sum of the per-card answer times reported by the client.
    #[must_use]
    pub fn total_time_secs(&self) -> u64 {
        self.total_time_secs
    }

    #[must_use]
    pub fn average_time_per_card_secs(&self) -> f64 {
        self.average_time_per_card_secs
    }

    #[must_use]
    pub fn breakdown(&self) -> &RatingBreakdown {
        &self.breakdown
    }

    #[must_use]
    pub fn transitions(&self) -> &TransitionCounts {
        &self.transitions
    }

    #[must_use]
    pub fn progress_before(&self) -> &DeckProgress {
        &self.progress_before
    }

    #[must_use]
    pub fn progress_after(&self) -> &DeckProgress {
        &self.progress_after
    }
}
