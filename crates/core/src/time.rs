use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Source of "now" for the engine.
///
/// Due status is always computed against a passed-in instant, so tests pin
/// the clock instead of sleeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// UTC calendar day of an instant.
#[must_use]
pub fn study_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Whole calendar days from `earlier` to `later` (negative if reversed).
#[must_use]
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    study_day(later)
        .signed_duration_since(study_day(earlier))
        .num_days()
}

/// `at` shifted by a whole number of days.
#[must_use]
pub fn add_days(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at + Duration::days(i64::from(days))
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(3));
        assert!(clock.is_fixed());

        let mut system = Clock::default();
        system.advance(Duration::days(1));
        assert!(!system.is_fixed());
    }

    #[test]
    fn days_between_uses_calendar_days() {
        // 22:13 UTC; two hours later is already the next day.
        let now = fixed_now();
        assert_eq!(days_between(now, now + Duration::hours(1)), 0);
        assert_eq!(days_between(now, now + Duration::hours(2)), 1);
        assert_eq!(days_between(now, now + Duration::hours(49)), 2);
        assert_eq!(days_between(now + Duration::days(1), now), -1);
    }

    #[test]
    fn add_days_shifts_whole_days() {
        assert_eq!(add_days(fixed_now(), 3), fixed_now() + Duration::days(3));
        assert_eq!(add_days(fixed_now(), 0), fixed_now());
    }
}
