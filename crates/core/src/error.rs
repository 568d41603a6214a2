use thiserror::Error;

use crate::model::{CardId, SessionId};

/// Domain errors of the review-session lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("nothing to review: no cards available for this session")]
    NoCardsAvailable,

    #[error("no active review session")]
    NoActiveSession,

    #[error("session mismatch: active session is {expected}, request was for {provided}")]
    SessionMismatch {
        expected: SessionId,
        provided: SessionId,
    },

    #[error("session is not active")]
    SessionNotActive,

    #[error("session is not paused")]
    SessionNotPaused,

    /// Recoverable: the engine falls back to a stored or default state.
    #[error("card {0} is not part of this session")]
    CardNotInSession(CardId),
}
