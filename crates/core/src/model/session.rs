use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::{
    CardId, DeckId, SessionId, UserId,
    progress::DeckProgress,
    review::{Rating, RatingRecord},
    scheduling::{QueuedCard, SchedulingState},
};

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Exact per-rating counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingBreakdown {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl RatingBreakdown {
    pub fn record(&mut self, rating: Rating) {
        let slot = match rating {
            Rating::Again => &mut self.again,
            Rating::Hard => &mut self.hard,
            Rating::Good => &mut self.good,
            Rating::Easy => &mut self.easy,
        };
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.again
            .saturating_add(self.hard)
            .saturating_add(self.good)
            .saturating_add(self.easy)
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.good.saturating_add(self.easy)
    }
}

impl<'a> FromIterator<&'a RatingRecord> for RatingBreakdown {
    fn from_iter<I: IntoIterator<Item = &'a RatingRecord>>(iter: I) -> Self {
        let mut breakdown = Self::default();
        for record in iter {
            breakdown.record(record.rating);
        }
        breakdown
    }
}

/// Running statistics of a session, updated on every rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub cards_reviewed: u32,
    pub correct: u32,
    /// Fraction of correct ratings in `0.0..=1.0`.
    pub accuracy: f64,
    pub breakdown: RatingBreakdown,
    pub total_time_secs: u64,
}

impl SessionStats {
    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, rating: Rating, time_spent_secs: u32) {
        self.cards_reviewed = self.cards_reviewed.saturating_add(1);
        if rating.is_correct() {
            self.correct = self.correct.saturating_add(1);
        }
        self.breakdown.record(rating);
        self.total_time_secs = self
            .total_time_secs
            .saturating_add(u64::from(time_spent_secs));
        self.accuracy = f64::from(self.correct) / f64::from(self.cards_reviewed);
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One learner's review session over a snapshot of a deck's queue.
///
/// Holds the lifecycle state machine (`Active ⇄ Paused → Completed`) and the
/// rating log. Scheduling is applied by the caller; the session records the
/// result and keeps its snapshot current so repeated ratings of the same card
/// build on each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSession {
    id: SessionId,
    user_id: UserId,
    deck_id: DeckId,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    paused_secs: u64,
    cards: Vec<QueuedCard>,
    current_index: usize,
    ratings: Vec<RatingRecord>,
    stats: SessionStats,
    progress_at_start: DeckProgress,
}

impl ReviewSession {
    /// Start a session over the given queue.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoCardsAvailable` if the queue is empty.
    pub fn start(
        id: SessionId,
        user_id: UserId,
        deck_id: DeckId,
        cards: Vec<QueuedCard>,
        progress_at_start: DeckProgress,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if cards.is_empty() {
            return Err(SessionError::NoCardsAvailable);
        }

        Ok(Self {
            id,
            user_id,
            deck_id,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
            paused_at: None,
            paused_secs: 0,
            cards,
            current_index: 0,
            ratings: Vec::new(),
            stats: SessionStats::default(),
            progress_at_start,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
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
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    /// Seconds spent paused across all closed pauses.
    #[must_use]
    pub fn paused_secs(&self) -> u64 {
        self.paused_secs
    }

    #[must_use]
    pub fn cards(&self) -> &[QueuedCard] {
        &self.cards
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_card(&self) -> Option<&QueuedCard> {
        self.cards.get(self.current_index)
    }

    /// Cards in the queue not yet reached.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.current_index)
    }

    /// True once every queued card has been stepped past.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.cards.len()
    }

    #[must_use]
    pub fn ratings(&self) -> &[RatingRecord] {
        &self.ratings
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[must_use]
    pub fn progress_at_start(&self) -> &DeckProgress {
        &self.progress_at_start
    }

    /// Guard used by every operation addressed to a session by id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionMismatch` if `id` is not this session's id.
    pub fn ensure_id(&self, id: SessionId) -> Result<(), SessionError> {
        if self.id == id {
            Ok(())
        } else {
            Err(SessionError::SessionMismatch {
                expected: self.id,
                provided: id,
            })
        }
    }

    /// Current scheduling snapshot of a card in this session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CardNotInSession` if the card was never queued.
    pub fn snapshot(&self, card_id: CardId) -> Result<&SchedulingState, SessionError> {
        self.cards
            .iter()
            .find(|c| c.card_id == card_id)
            .map(|c| &c.state)
            .ok_or(SessionError::CardNotInSession(card_id))
    }

    /// Record an applied rating.
    ///
    /// Updates the card's snapshot (when it is part of the queue), the
    /// running stats, and advances the cursor if the rated card is the
    /// current one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` unless the session is active.
    pub fn record_rating(
        &mut self,
        record: RatingRecord,
        next: SchedulingState,
    ) -> Result<&RatingRecord, SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::SessionNotActive);
        }

        if let Some(queued) = self.cards.iter_mut().find(|c| c.card_id == record.card_id) {
            queued.state = next;
        }

        if self
            .current_card()
            .is_some_and(|c| c.card_id == record.card_id)
        {
            self.current_index += 1;
        }

        self.stats.record(record.rating, record.time_spent_secs);
        self.ratings.push(record);
        self.ratings.last().ok_or(SessionError::SessionNotActive)
    }

    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` unless the session is active.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::SessionNotActive);
        }
        self.status = SessionStatus::Paused;
        self.paused_at = Some(now);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::SessionNotPaused` unless the session is paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status != SessionStatus::Paused {
            return Err(SessionError::SessionNotPaused);
        }
        self.close_pause(now);
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Mark the session completed. Terminal.
    ///
    /// An open pause is closed at `now` so it does not count as active time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionNotActive` if the session already completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.status == SessionStatus::Completed {
            return Err(SessionError::SessionNotActive);
        }
        self.close_pause(now);
        self.status = SessionStatus::Completed;
        self.ended_at = Some(now.max(self.started_at));
        Ok(())
    }

    /// Wall-clock seconds between start and `until` (or the end, when completed).
    #[must_use]
    pub fn elapsed_secs(&self, until: DateTime<Utc>) -> u64 {
        let end = self.ended_at.unwrap_or(until);
        u64::try_from(end.signed_duration_since(self.started_at).num_seconds()).unwrap_or(0)
    }

    /// Wall-clock time minus time spent paused.
    #[must_use]
    pub fn active_secs(&self, until: DateTime<Utc>) -> u64 {
        let open_pause = match (self.status, self.paused_at) {
            (SessionStatus::Paused, Some(at)) => {
                u64::try_from(until.signed_duration_since(at).num_seconds()).unwrap_or(0)
            }
            _ => 0,
        };
        self.elapsed_secs(until)
            .saturating_sub(self.paused_secs)
            .saturating_sub(open_pause)
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(at) = self.paused_at.take() {
            let secs = u64::try_from(now.signed_duration_since(at).num_seconds()).unwrap_or(0);
            self.paused_secs = self.paused_secs.saturating_add(secs);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CardState;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn queued(id: u64) -> QueuedCard {
        QueuedCard::new(CardId::new(id), SchedulingState::new_card(fixed_now()))
    }

    fn session(cards: Vec<QueuedCard>) -> ReviewSession {
        ReviewSession::start(
            SessionId::generate(),
            UserId::new(1),
            DeckId::new(1),
            cards,
            DeckProgress::default(),
            fixed_now(),
        )
        .unwrap()
    }

    fn record(card: u64, rating: Rating, secs: u32) -> RatingRecord {
        RatingRecord {
            card_id: CardId::new(card),
            rating,
            time_spent_secs: secs,
            reviewed_at: fixed_now(),
            state_before: CardState::New,
            state_after: CardState::Learning,
        }
    }

    fn learning_state() -> SchedulingState {
        SchedulingState {
            card_state: CardState::Learning,
            repetitions: 1,
            interval_days: 1,
            ..SchedulingState::new_card(fixed_now())
        }
    }

    #[test]
    fn empty_queue_is_rejected() {
        let err = ReviewSession::start(
            SessionId::generate(),
            UserId::new(1),
            DeckId::new(1),
            Vec::new(),
            DeckProgress::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, SessionError::NoCardsAvailable);
    }

    #[test]
    fn rating_updates_snapshot_stats_and_cursor() {
        let mut s = session(vec![queued(1), queued(2)]);

        s.record_rating(record(1, Rating::Good, 10), learning_state())
            .unwrap();

        assert_eq!(s.current_index(), 1);
        assert_eq!(s.snapshot(CardId::new(1)).unwrap().card_state, CardState::Learning);
        assert_eq!(s.stats().cards_reviewed, 1);
        assert_eq!(s.stats().correct, 1);
        assert!((s.stats().accuracy - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.stats().total_time_secs, 10);

        s.record_rating(record(2, Rating::Again, 5), learning_state())
            .unwrap();
        assert!((s.stats().accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.stats().breakdown.again, 1);
        assert!(s.is_exhausted());
    }

    #[test]
    fn out_of_order_rating_does_not_move_cursor() {
        let mut s = session(vec![queued(1), queued(2)]);
        s.record_rating(record(2, Rating::Hard, 3), learning_state())
            .unwrap();
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.ratings().len(), 1);
    }

    #[test]
    fn rating_for_unknown_card_is_still_logged() {
        let mut s = session(vec![queued(1)]);
        assert_eq!(
            s.snapshot(CardId::new(9)).unwrap_err(),
            SessionError::CardNotInSession(CardId::new(9))
        );
        s.record_rating(record(9, Rating::Good, 1), learning_state())
            .unwrap();
        assert_eq!(s.stats().cards_reviewed, 1);
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn paused_session_rejects_ratings() {
        let mut s = session(vec![queued(1)]);
        s.pause(fixed_now()).unwrap();
        let err = s
            .record_rating(record(1, Rating::Good, 1), learning_state())
            .unwrap_err();
        assert_eq!(err, SessionError::SessionNotActive);
    }

    #[test]
    fn pause_resume_transitions_are_guarded() {
        let mut s = session(vec![queued(1)]);
        assert_eq!(s.resume(fixed_now()), Err(SessionError::SessionNotPaused));

        s.pause(fixed_now()).unwrap();
        assert_eq!(s.status(), SessionStatus::Paused);
        assert_eq!(s.paused_at(), Some(fixed_now()));
        assert_eq!(s.pause(fixed_now()), Err(SessionError::SessionNotActive));

        s.resume(fixed_now() + Duration::seconds(90)).unwrap();
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.paused_at(), None);
        assert_eq!(s.paused_secs(), 90);
    }

    #[test]
    fn completed_is_terminal() {
        let mut s = session(vec![queued(1)]);
        s.complete(fixed_now() + Duration::minutes(5)).unwrap();
        assert_eq!(s.status(), SessionStatus::Completed);
        assert_eq!(s.complete(fixed_now()), Err(SessionError::SessionNotActive));
        assert_eq!(s.pause(fixed_now()), Err(SessionError::SessionNotActive));
        assert_eq!(s.resume(fixed_now()), Err(SessionError::SessionNotPaused));
        assert_eq!(s.elapsed_secs(fixed_now() + Duration::days(1)), 300);
    }

    #[test]
    fn active_time_excludes_pauses() {
        let start = fixed_now();
        let mut s = session(vec![queued(1)]);
        s.pause(start + Duration::seconds(60)).unwrap();
        assert_eq!(s.active_secs(start + Duration::seconds(100)), 60);

        s.complete(start + Duration::seconds(120)).unwrap();
        assert_eq!(s.elapsed_secs(start + Duration::seconds(120)), 120);
        assert_eq!(s.active_secs(start + Duration::seconds(120)), 60);
    }

    #[test]
    fn ensure_id_reports_mismatch() {
        let s = session(vec![queued(1)]);
        assert!(s.ensure_id(s.id()).is_ok());
        let other = SessionId::generate();
        assert_eq!(
            s.ensure_id(other),
            Err(SessionError::SessionMismatch {
                expected: s.id(),
                provided: other,
            })
        );
    }

    #[test]
    fn session_survives_json_round_trip() {
        let mut s = session(vec![queued(1), queued(2)]);
        s.record_rating(record(1, Rating::Easy, 4), learning_state())
            .unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let back: ReviewSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
