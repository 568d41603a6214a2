use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ids::CardId, scheduling::CardState};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised when decoding a rating from outside the type system.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RatingError {
    #[error("invalid rating value: {0}")]
    InvalidValue(u8),

    #[error("unknown rating name: {0}")]
    UnknownName(String),
}

//
// ─── RATING ───────────────────────────────────────────────────────────────────
//

/// Four-level recall rating submitted after a card is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    /// Failed to recall the answer.
    Again,
    /// Recalled with significant difficulty.
    Hard,
    /// Recalled correctly with appropriate effort.
    Good,
    /// Recalled instantly.
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Converts a numeric rating (0-3) to a `Rating`.
    ///
    /// # Errors
    ///
    /// Returns `RatingError::InvalidValue` if the value is not in the range 0-3.
    pub fn from_u8(value: u8) -> Result<Self, RatingError> {
        match value {
            0 => Ok(Self::Again),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            _ => Err(RatingError::InvalidValue(value)),
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }

    /// `Good` and `Easy` count towards accuracy.
    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }
}

impl std::str::FromStr for Rating {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" | "a" => Ok(Self::Again),
            "hard" | "h" => Ok(Self::Hard),
            "good" | "g" => Ok(Self::Good),
            "easy" | "e" => Ok(Self::Easy),
            other => Err(RatingError::UnknownName(other.to_owned())),
        }
    }
}

//
// ─── RATING RECORD ────────────────────────────────────────────────────────────
//

/// One entry in a session's rating log.
///
/// Keeps the card state on both sides of the update so transitions can be
/// counted exactly at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub card_id: CardId,
    pub rating: Rating,
    pub time_spent_secs: u32,
    pub reviewed_at: DateTime<Utc>,
    pub state_before: CardState,
    pub state_after: CardState,
}

impl RatingRecord {
    #[must_use]
    pub fn is_transition(&self) -> bool {
        self.state_before != self.state_after
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_rating_conversion_works() {
        assert_eq!(Rating::from_u8(0).unwrap(), Rating::Again);
        assert_eq!(Rating::from_u8(3).unwrap(), Rating::Easy);
        assert_eq!(Rating::from_u8(4).unwrap_err(), RatingError::InvalidValue(4));
        for rating in Rating::ALL {
            assert_eq!(Rating::from_u8(rating.as_u8()).unwrap(), rating);
        }
    }

    #[test]
    fn parses_names_and_shorthands() {
        assert_eq!("Good".parse::<Rating>().unwrap(), Rating::Good);
        assert_eq!(" e ".parse::<Rating>().unwrap(), Rating::Easy);
        assert!(matches!(
            "meh".parse::<Rating>(),
            Err(RatingError::UnknownName(name)) if name == "meh"
        ));
    }

    #[test]
    fn only_good_and_easy_are_correct() {
        assert!(!Rating::Again.is_correct());
        assert!(!Rating::Hard.is_correct());
        assert!(Rating::Good.is_correct());
        assert!(Rating::Easy.is_correct());
    }
}
