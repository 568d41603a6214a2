#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    ActiveSessionStore, CardCatalog, DeckProgressStore, InMemoryRepository,
    SchedulingStore, SessionSummaryRepository, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
