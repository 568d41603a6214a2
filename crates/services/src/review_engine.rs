use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{rng, seq::SliceRandom};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use srs_core::aggregate::{Aggregation, summarize};
use srs_core::model::{
    Card, CardId, CardState, DeckId, DeckProgress, QueuedCard, Rating, RatingRecord,
    ReviewSession, ReviewSettings, SchedulingState, SessionId, SessionStats, SessionStatus,
    SessionSummary, UserId,
};
use srs_core::queue::{QueueBuilder, QueueLimits};
use srs_core::scheduler::{ScheduledStates, Scheduler};
use srs_core::{Clock, SessionError};
use storage::repository::{Storage, StorageError};

use crate::error::ReviewEngineError;

//
// ─── RATING OUTCOME ────────────────────────────────────────────────────────────
//

/// What the caller gets back after a rating is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub card_id: CardId,
    pub rating: Rating,
    pub previous_state: CardState,
    /// The scheduling state written to the store.
    pub state: SchedulingState,
    pub stats: SessionStats,
    /// Queue cards not yet reached.
    pub remaining: usize,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Review engine for one learner.
///
/// Owns the session lifecycle: builds the queue, applies ratings through the
/// scheduler, and folds a finished session into deck progress. Mutating
/// operations are serialized by a per-learner async mutex, so two concurrent
/// ratings can never interleave their reads and writes of the session slot.
#[derive(Clone)]
pub struct ReviewEngine {
    clock: Clock,
    user_id: UserId,
    settings: ReviewSettings,
    scheduler: Scheduler,
    storage: Storage,
    lock: Arc<Mutex<()>>,
    shuffle_new: bool,
}

impl ReviewEngine {
    /// Create an engine bound to `user_id`, using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ReviewEngineError::Settings` if the scheduler parameters are invalid.
    pub fn new(
        user_id: UserId,
        storage: Storage,
        settings: ReviewSettings,
    ) -> Result<Self, ReviewEngineError> {
        let scheduler = Scheduler::with_params(settings.scheduler().clone())?;
        Ok(Self {
            clock: Clock::default(),
            user_id,
            settings,
            scheduler,
            storage,
            lock: Arc::new(Mutex::new(())),
            shuffle_new: false,
        })
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Shuffle unseen cards among themselves when building a session queue.
    #[must_use]
    pub fn with_shuffle_new(mut self, shuffle_new: bool) -> Self {
        self.shuffle_new = shuffle_new;
        self
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    /// Start a review session for a deck.
    ///
    /// With `card_ids`, exactly those cards are used in the given order (ids
    /// not in the deck are skipped); otherwise the queue builder selects the
    /// due cards under the configured limits. Any previous active session is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoCardsAvailable` if nothing can be reviewed,
    /// or `StorageError` if the stores fail.
    pub async fn start(
        &self,
        deck_id: DeckId,
        card_ids: Option<&[CardId]>,
    ) -> Result<ReviewSession, ReviewEngineError> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();

        let (cards, states) = self.load_deck(deck_id).await?;
        let queue = match card_ids {
            Some(ids) => explicit_queue(deck_id, ids, &cards, &states, now),
            None => {
                let mut queue =
                    QueueBuilder::build(&cards, &states, now, QueueLimits::from(&self.settings));
                if self.shuffle_new {
                    shuffle_new_cards(&mut queue);
                }
                queue
            }
        };

        let progress = match self.storage.progress.get_progress(deck_id).await? {
            Some(progress) => progress,
            None => derive_progress(&cards, &states, now),
        };

        let session = ReviewSession::start(
            SessionId::generate(),
            self.user_id,
            deck_id,
            queue,
            progress,
            now,
        )?;

        if let Some(previous) = self.storage.sessions.load_active().await? {
            warn!(
                previous = %previous.id(),
                status = ?previous.status(),
                "replacing unfinished review session"
            );
        }
        self.storage.sessions.save_active(&session).await?;

        info!(
            session_id = %session.id(),
            user_id = %self.user_id,
            deck_id = %deck_id,
            cards = session.cards().len(),
            "review session started"
        );
        Ok(session)
    }

    /// Apply a rating to a card in the active session.
    ///
    /// The card's current state comes from the session snapshot, then the
    /// scheduling store, then the new-card default. A card outside the
    /// session queue is still rated.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveSession`, `SessionMismatch` or `SessionNotActive`
    /// (paused or completed), or `StorageError` if the stores fail.
    pub async fn submit_rating(
        &self,
        session_id: SessionId,
        card_id: CardId,
        rating: Rating,
        time_spent_secs: u32,
    ) -> Result<RatingOutcome, ReviewEngineError> {
        let _guard = self.lock.lock().await;
        let mut session = self.active_session(session_id).await?;
        if session.status() != SessionStatus::Active {
            return Err(SessionError::SessionNotActive.into());
        }
        let now = self.clock.now();

        let before = match session.snapshot(card_id) {
            Ok(state) => state.clone(),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "rating a card outside the session queue");
                match self.storage.states.get_state(card_id).await? {
                    Some(state) => state,
                    None => SchedulingState::new_card(now),
                }
            }
        };
        let after = self.scheduler.apply(&before, rating, now);
        self.storage.states.set_state(card_id, &after).await?;

        let record = RatingRecord {
            card_id,
            rating,
            time_spent_secs,
            reviewed_at: now,
            state_before: before.card_state,
            state_after: after.card_state,
        };
        session.record_rating(record, after.clone())?;
        self.storage.sessions.save_active(&session).await?;

        debug!(
            session_id = %session_id,
            card_id = %card_id,
            rating = rating.as_str(),
            from = before.card_state.as_str(),
            to = after.card_state.as_str(),
            interval_days = after.interval_days,
            "rating applied"
        );

        Ok(RatingOutcome {
            card_id,
            rating,
            previous_state: before.card_state,
            state: after,
            stats: session.stats().clone(),
            remaining: session.remaining(),
        })
    }

    /// # Errors
    ///
    /// Returns `NoActiveSession`, `SessionMismatch`, `SessionNotActive`, or a storage error.
    pub async fn pause(&self, session_id: SessionId) -> Result<ReviewSession, ReviewEngineError> {
        let _guard = self.lock.lock().await;
        let mut session = self.active_session(session_id).await?;
        session.pause(self.clock.now())?;
        self.storage.sessions.save_active(&session).await?;
        debug!(session_id = %session_id, "review session paused");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `NoActiveSession`, `SessionMismatch`, `SessionNotPaused`, or a storage error.
    pub async fn resume(&self, session_id: SessionId) -> Result<ReviewSession, ReviewEngineError> {
        let _guard = self.lock.lock().await;
        let mut session = self.active_session(session_id).await?;
        session.resume(self.clock.now())?;
        self.storage.sessions.save_active(&session).await?;
        debug!(session_id = %session_id, paused_secs = session.paused_secs(), "review session resumed");
        Ok(session)
    }

    /// Finish the active session and fold it into the deck's progress.
    ///
    /// Writes the new deck progress, appends the summary to the log and
    /// empties the active-session slot. Ratings of cards that are not in the
    /// session's deck are summarized but leave the deck's counters alone.
    ///
    /// Retrying after a failed slot clear is safe: the progress is recomputed
    /// from the session's starting snapshot, and a summary already in the log
    /// is kept.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveSession` or `SessionMismatch`, or a storage error.
    pub async fn end(&self, session_id: SessionId) -> Result<SessionSummary, ReviewEngineError> {
        let _guard = self.lock.lock().await;
        let mut session = self.active_session(session_id).await?;
        let now = self.clock.now();
        session.complete(now)?;

        let deck_id = session.deck_id();
        let (cards, states) = self.load_deck(deck_id).await?;
        let due_today = QueueBuilder::due_count(&cards, &states, now);
        let deck_cards: HashSet<CardId> = cards.iter().map(Card::id).collect();

        let strays = session
            .ratings()
            .iter()
            .filter(|r| !deck_cards.contains(&r.card_id))
            .count();
        if strays > 0 {
            warn!(
                session_id = %session_id,
                deck_id = %deck_id,
                ratings = strays,
                "ratings for cards outside the deck; deck counters not moved"
            );
        }

        let Aggregation { summary, underflow } =
            summarize(&session, now, due_today, |id| deck_cards.contains(&id));
        for bucket in underflow {
            warn!(
                deck_id = %deck_id,
                bucket = ?bucket,
                "deck progress out of sync with card states; clamped at zero"
            );
        }

        self.storage
            .progress
            .set_progress(deck_id, summary.progress_after())
            .await?;
        let summary_id = match self.storage.summaries.append_summary(&summary).await {
            Ok(id) => Some(id),
            Err(StorageError::Conflict) => {
                warn!(session_id = %session_id, "session already summarized; clearing the slot");
                None
            }
            Err(err) => return Err(err.into()),
        };
        self.storage.sessions.clear_active().await?;

        info!(
            session_id = %session_id,
            summary_id = ?summary_id,
            cards_reviewed = summary.cards_reviewed(),
            accuracy = summary.accuracy(),
            streak = summary.progress_after().streak,
            "review session ended"
        );
        Ok(summary)
    }

    /// The learner's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read.
    pub async fn current_session(&self) -> Result<Option<ReviewSession>, ReviewEngineError> {
        Ok(self.storage.sessions.load_active().await?)
    }

    /// What the next session would contain, without starting it.
    ///
    /// `max_cards` overrides the configured session size.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for a zero `max_cards`, or a storage error.
    pub async fn queue(
        &self,
        deck_id: DeckId,
        max_cards: Option<u32>,
    ) -> Result<Vec<QueuedCard>, ReviewEngineError> {
        let settings = match max_cards {
            Some(max) => self.settings.with_max_cards(max)?,
            None => self.settings.clone(),
        };
        let (cards, states) = self.load_deck(deck_id).await?;
        Ok(QueueBuilder::build(
            &cards,
            &states,
            self.clock.now(),
            QueueLimits::from(&settings),
        ))
    }

    /// Stored scheduling state of a card; `None` if it was never rated.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub async fn history(
        &self,
        card_id: CardId,
    ) -> Result<Option<SchedulingState>, ReviewEngineError> {
        Ok(self.storage.states.get_state(card_id).await?)
    }

    /// Outcome of each rating for a card, for "next review in N days" hints.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub async fn preview(&self, card_id: CardId) -> Result<ScheduledStates, ReviewEngineError> {
        let now = self.clock.now();
        let snapshot = self
            .storage
            .sessions
            .load_active()
            .await?
            .and_then(|session| session.snapshot(card_id).ok().cloned());
        let state = match snapshot {
            Some(state) => state,
            None => self
                .storage
                .states
                .get_state(card_id)
                .await?
                .unwrap_or_else(|| SchedulingState::new_card(now)),
        };
        Ok(self.scheduler.preview(&state, now))
    }

    /// Stored deck progress, derived from card states when none was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stores cannot be read.
    pub async fn progress(&self, deck_id: DeckId) -> Result<DeckProgress, ReviewEngineError> {
        if let Some(progress) = self.storage.progress.get_progress(deck_id).await? {
            return Ok(progress);
        }
        let (cards, states) = self.load_deck(deck_id).await?;
        Ok(derive_progress(&cards, &states, self.clock.now()))
    }

    /// Most recent session summaries for a deck, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    pub async fn recent_summaries(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, ReviewEngineError> {
        Ok(self.storage.summaries.list_summaries(deck_id, limit).await?)
    }

    async fn active_session(&self, session_id: SessionId) -> Result<ReviewSession, ReviewEngineError> {
        let session = self
            .storage
            .sessions
            .load_active()
            .await?
            .ok_or(SessionError::NoActiveSession)?;
        session.ensure_id(session_id)?;
        Ok(session)
    }

    async fn load_deck(
        &self,
        deck_id: DeckId,
    ) -> Result<(Vec<Card>, HashMap<CardId, SchedulingState>), ReviewEngineError> {
        let cards = self.storage.cards.cards_for_deck(deck_id).await?;
        let ids: Vec<CardId> = cards.iter().map(Card::id).collect();
        let states = self.storage.states.states_for(&ids).await?;
        Ok((cards, states))
    }
}

//
// ─── HELPERS ───────────────────────────────────────────────────────────────────
//

fn explicit_queue(
    deck_id: DeckId,
    ids: &[CardId],
    cards: &[Card],
    states: &HashMap<CardId, SchedulingState>,
    now: DateTime<Utc>,
) -> Vec<QueuedCard> {
    let known: HashSet<CardId> = cards.iter().map(Card::id).collect();
    let mut seen = HashSet::new();
    let mut queue = Vec::with_capacity(ids.len());
    for id in ids {
        if !known.contains(id) {
            warn!(deck_id = %deck_id, card_id = %id, "requested card is not in the deck; skipped");
            continue;
        }
        if !seen.insert(*id) {
            continue;
        }
        let state = states
            .get(id)
            .cloned()
            .unwrap_or_else(|| SchedulingState::new_card(now));
        queue.push(QueuedCard::new(*id, state));
    }
    queue
}

fn derive_progress(
    cards: &[Card],
    states: &HashMap<CardId, SchedulingState>,
    now: DateTime<Utc>,
) -> DeckProgress {
    let mut progress = DeckProgress::from_states(cards.iter().map(|card| {
        states
            .get(&card.id())
            .map_or(CardState::New, |s| s.card_state)
    }));
    progress.due_today = QueueBuilder::due_count(cards, states, now);
    progress
}

/// Shuffle the block of new cards in a built queue, leaving the other groups in place.
fn shuffle_new_cards(queue: &mut [QueuedCard]) {
    let is_new = |q: &QueuedCard| q.state.card_state == CardState::New;
    let (Some(first), Some(last)) = (queue.iter().position(is_new), queue.iter().rposition(is_new))
    else {
        return;
    };
    queue[first..=last].shuffle(&mut rng());
}
