use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use srs_core::model::{
    Card, CardId, DeckId, DeckProgress, ReviewSession, SchedulingState, SessionSummary,
};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read access to the card catalog. The review engine never edits cards.
#[async_trait]
pub trait CardCatalog: Send + Sync {
    /// All cards of a deck in deck order (`position`, then id).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn cards_for_deck(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError>;

    /// Insert or replace a card. Used for seeding and imports.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the card cannot be stored.
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError>;
}

/// Per-learner scheduling state, keyed by card id.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_state(&self, card_id: CardId) -> Result<Option<SchedulingState>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the state cannot be written.
    async fn set_state(&self, card_id: CardId, state: &SchedulingState)
    -> Result<(), StorageError>;

    /// Stored states for the given cards. Cards without a state are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn states_for(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, SchedulingState>, StorageError>;
}

/// Single-slot store for the learner's in-flight session.
#[async_trait]
pub trait ActiveSessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read or decoded.
    async fn load_active(&self) -> Result<Option<ReviewSession>, StorageError>;

    /// Write the session into the slot, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn save_active(&self, session: &ReviewSession) -> Result<(), StorageError>;

    /// Empty the slot. Clearing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be written.
    async fn clear_active(&self) -> Result<(), StorageError>;
}

/// Cumulative per-deck progress counters.
#[async_trait]
pub trait DeckProgressStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_progress(&self, deck_id: DeckId) -> Result<Option<DeckProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the progress cannot be written.
    async fn set_progress(
        &self,
        deck_id: DeckId,
        progress: &DeckProgress,
    ) -> Result<(), StorageError>;
}

/// Append-only log of finished sessions.
#[async_trait]
pub trait SessionSummaryRepository: Send + Sync {
    /// Append a summary and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session was already summarized,
    /// or other storage errors.
    async fn append_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError>;

    /// Most recent summaries for a deck, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    async fn list_summaries(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// In-memory repository for one learner. Used by tests and the demo driver.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    cards: Arc<Mutex<HashMap<CardId, Card>>>,
    states: Arc<Mutex<HashMap<CardId, SchedulingState>>>,
    active: Arc<Mutex<Option<ReviewSession>>>,
    progress: Arc<Mutex<HashMap<DeckId, DeckProgress>>>,
    summaries: Arc<Mutex<Vec<SessionSummary>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

#[async_trait]
impl CardCatalog for InMemoryRepository {
    async fn cards_for_deck(&self, deck_id: DeckId) -> Result<Vec<Card>, StorageError> {
        let guard = lock(&self.cards)?;
        let mut cards: Vec<Card> = guard
            .values()
            .filter(|c| c.deck_id() == deck_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| (c.position(), c.id().value()));
        Ok(cards)
    }

    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        lock(&self.cards)?.insert(card.id(), card.clone());
        Ok(())
    }
}

#[async_trait]
impl SchedulingStore for InMemoryRepository {
    async fn get_state(&self, card_id: CardId) -> Result<Option<SchedulingState>, StorageError> {
        Ok(lock(&self.states)?.get(&card_id).cloned())
    }

    async fn set_state(
        &self,
        card_id: CardId,
        state: &SchedulingState,
    ) -> Result<(), StorageError> {
        lock(&self.states)?.insert(card_id, state.clone());
        Ok(())
    }

    async fn states_for(
        &self,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, SchedulingState>, StorageError> {
        let guard = lock(&self.states)?;
        Ok(card_ids
            .iter()
            .filter_map(|id| guard.get(id).map(|s| (*id, s.clone())))
            .collect())
    }
}

#[async_trait]
impl ActiveSessionStore for InMemoryRepository {
    async fn load_active(&self) -> Result<Option<ReviewSession>, StorageError> {
        Ok(lock(&self.active)?.clone())
    }

    async fn save_active(&self, session: &ReviewSession) -> Result<(), StorageError> {
        *lock(&self.active)? = Some(session.clone());
        Ok(())
    }

    async fn clear_active(&self) -> Result<(), StorageError> {
        lock(&self.active)?.take();
        Ok(())
    }
}

#[async_trait]
impl DeckProgressStore for InMemoryRepository {
    async fn get_progress(&self, deck_id: DeckId) -> Result<Option<DeckProgress>, StorageError> {
        Ok(lock(&self.progress)?.get(&deck_id).cloned())
    }

    async fn set_progress(
        &self,
        deck_id: DeckId,
        progress: &DeckProgress,
    ) -> Result<(), StorageError> {
        lock(&self.progress)?.insert(deck_id, progress.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionSummaryRepository for InMemoryRepository {
    async fn append_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError> {
        let mut guard = lock(&self.summaries)?;
        if guard
            .iter()
            .any(|s| s.session_id() == summary.session_id())
        {
            return Err(StorageError::Conflict);
        }
        guard.push(summary.clone());
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("summary id overflow".into()))?;
        debug!(id, session_id = %summary.session_id(), "summary appended");
        Ok(id)
    }

    async fn list_summaries(
        &self,
        deck_id: DeckId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let guard = lock(&self.summaries)?;
        // insertion order is append order; newest first
        Ok(guard
            .iter()
            .rev()
            .filter(|s| s.deck_id() == deck_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

//
// ─── STORAGE BUNDLE ────────────────────────────────────────────────────────────
//

/// Bundles the store contracts behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub cards: Arc<dyn CardCatalog>,
    pub states: Arc<dyn SchedulingStore>,
    pub sessions: Arc<dyn ActiveSessionStore>,
    pub progress: Arc<dyn DeckProgressStore>,
    pub summaries: Arc<dyn SessionSummaryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Wire every contract to the same repository.
    #[must_use]
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: CardCatalog
            + SchedulingStore
            + ActiveSessionStore
            + DeckProgressStore
            + SessionSummaryRepository
            + Clone
            + 'static,
    {
        Self {
            cards: Arc::new(repo.clone()),
            states: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            summaries: Arc::new(repo),
        }
    }
}
