//! Shared error types for the services crate.

use thiserror::Error;

use srs_core::SessionError;
use srs_core::model::SettingsError;
use storage::repository::StorageError;

/// Errors emitted by `ReviewEngine`.
///
/// Session errors are domain outcomes the caller can act on; storage errors
/// are opaque infrastructure failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewEngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ReviewEngineError {
    /// The domain error, if this is one.
    #[must_use]
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}
