use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::scheduling::{DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("max cards per session must be > 0")]
    InvalidMaxCards,

    #[error("ease floor must be finite and >= 1.3, got {0}")]
    InvalidEaseFloor(f64),

    #[error("initial ease must be >= the ease floor, got {0}")]
    InvalidInitialEase(f64),

    #[error("ease adjustments must be finite and >= 0")]
    InvalidEaseDelta,

    #[error("hard multiplier must be finite and >= 1.0, got {0}")]
    InvalidHardMultiplier(f64),

    #[error("easy bonus must be finite and >= 1.0, got {0}")]
    InvalidEasyBonus(f64),

    #[error("graduating interval must be at least 1 day")]
    InvalidGraduatingInterval,

    #[error("easy graduating interval must be >= the graduating interval")]
    InvalidEasyGraduatingInterval,

    #[error("mastery interval must be at least 1 day")]
    InvalidMasteryInterval,
}

//
// ─── SCHEDULER PARAMETERS ──────────────────────────────────────────────────────
//

/// Tunables for the SM-2 scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    pub ease_floor: f64,
    pub initial_ease: f64,
    pub again_ease_penalty: f64,
    pub hard_ease_penalty: f64,
    pub easy_ease_bonus: f64,
    pub hard_interval_multiplier: f64,
    pub easy_interval_bonus: f64,
    pub graduating_interval_days: u32,
    pub easy_graduating_interval_days: u32,
    /// Interval assigned after a lapse. Zero means "review again today".
    pub relearn_step_days: u32,
    pub mastery_interval_days: u32,
    pub mastery_repetitions: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            ease_floor: MIN_EASE_FACTOR,
            initial_ease: DEFAULT_EASE_FACTOR,
            again_ease_penalty: 0.20,
            hard_ease_penalty: 0.15,
            easy_ease_bonus: 0.15,
            hard_interval_multiplier: 1.2,
            easy_interval_bonus: 1.3,
            graduating_interval_days: 1,
            easy_graduating_interval_days: 4,
            relearn_step_days: 0,
            mastery_interval_days: 21,
            mastery_repetitions: 8,
        }
    }
}

impl SchedulerParams {
    /// Checks the parameters keep the scheduler total and its invariants intact.
    ///
    /// # Errors
    ///
    /// Returns the first `SettingsError` found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.ease_floor.is_finite() || self.ease_floor < MIN_EASE_FACTOR {
            return Err(SettingsError::InvalidEaseFloor(self.ease_floor));
        }
        if !self.initial_ease.is_finite() || self.initial_ease < self.ease_floor {
            return Err(SettingsError::InvalidInitialEase(self.initial_ease));
        }
        let deltas = [
            self.again_ease_penalty,
            self.hard_ease_penalty,
            self.easy_ease_bonus,
        ];
        if deltas.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(SettingsError::InvalidEaseDelta);
        }
        if !self.hard_interval_multiplier.is_finite() || self.hard_interval_multiplier < 1.0 {
            return Err(SettingsError::InvalidHardMultiplier(
                self.hard_interval_multiplier,
            ));
        }
        if !self.easy_interval_bonus.is_finite() || self.easy_interval_bonus < 1.0 {
            return Err(SettingsError::InvalidEasyBonus(self.easy_interval_bonus));
        }
        if self.graduating_interval_days == 0 {
            return Err(SettingsError::InvalidGraduatingInterval);
        }
        if self.easy_graduating_interval_days < self.graduating_interval_days {
            return Err(SettingsError::InvalidEasyGraduatingInterval);
        }
        if self.mastery_interval_days == 0 {
            return Err(SettingsError::InvalidMasteryInterval);
        }
        Ok(())
    }
}

//
// ─── REVIEW SETTINGS ───────────────────────────────────────────────────────────
//

/// Per-learner configuration of the review engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSettings {
    max_cards: u32,
    max_new_cards: u32,
    max_review_cards: u32,
    scheduler: SchedulerParams,
}

impl Default for ReviewSettings {
    /// 20 cards per session, at most 10 of them unseen, 100 due reviews.
    fn default() -> Self {
        Self {
            max_cards: 20,
            max_new_cards: 10,
            max_review_cards: 100,
            scheduler: SchedulerParams::default(),
        }
    }
}

impl ReviewSettings {
    /// Creates custom settings.
    ///
    /// A `max_new_cards` of zero is allowed and means "reviews only".
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if `max_cards` is zero or the scheduler
    /// parameters are invalid.
    pub fn new(
        max_cards: u32,
        max_new_cards: u32,
        max_review_cards: u32,
        scheduler: SchedulerParams,
    ) -> Result<Self, SettingsError> {
        if max_cards == 0 {
            return Err(SettingsError::InvalidMaxCards);
        }
        scheduler.validate()?;
        Ok(Self {
            max_cards,
            max_new_cards,
            max_review_cards,
            scheduler,
        })
    }

    /// Returns a copy with a different session size, keeping the other limits.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidMaxCards` if `max_cards` is zero.
    pub fn with_max_cards(&self, max_cards: u32) -> Result<Self, SettingsError> {
        Self::new(
            max_cards,
            self.max_new_cards,
            self.max_review_cards,
            self.scheduler.clone(),
        )
    }

    #[must_use]
    pub fn max_cards(&self) -> u32 {
        self.max_cards
    }

    #[must_use]
    pub fn max_new_cards(&self) -> u32 {
        self.max_new_cards
    }

    #[must_use]
    pub fn max_review_cards(&self) -> u32 {
        self.max_review_cards
    }

    #[must_use]
    pub fn scheduler(&self) -> &SchedulerParams {
        &self.scheduler
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = ReviewSettings::default();
        assert_eq!(settings.max_cards(), 20);
        assert_eq!(settings.max_new_cards(), 10);
        assert_eq!(settings.max_review_cards(), 100);
        assert!(settings.scheduler().validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_cards() {
        let err = ReviewSettings::new(0, 5, 5, SchedulerParams::default()).unwrap_err();
        assert_eq!(err, SettingsError::InvalidMaxCards);
        assert!(ReviewSettings::new(5, 0, 5, SchedulerParams::default()).is_ok());
    }

    #[test]
    fn rejects_ease_floor_below_the_minimum_ease() {
        for ease_floor in [1.0, 1.29, f64::NAN] {
            let params = SchedulerParams {
                ease_floor,
                ..SchedulerParams::default()
            };
            assert!(matches!(
                params.validate(),
                Err(SettingsError::InvalidEaseFloor(_))
            ));
        }
        let raised = SchedulerParams {
            ease_floor: 1.5,
            ..SchedulerParams::default()
        };
        assert_eq!(raised.validate(), Ok(()));
    }

    #[test]
    fn rejects_shrinking_multipliers() {
        let params = SchedulerParams {
            hard_interval_multiplier: 0.9,
            ..SchedulerParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SettingsError::InvalidHardMultiplier(_))
        ));

        let params = SchedulerParams {
            easy_interval_bonus: f64::NAN,
            ..SchedulerParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SettingsError::InvalidEasyBonus(_))
        ));
    }

    #[test]
    fn rejects_negative_deltas_and_bad_intervals() {
        let params = SchedulerParams {
            again_ease_penalty: -0.2,
            ..SchedulerParams::default()
        };
        assert_eq!(params.validate(), Err(SettingsError::InvalidEaseDelta));

        let params = SchedulerParams {
            graduating_interval_days: 0,
            ..SchedulerParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(SettingsError::InvalidGraduatingInterval)
        );

        let params = SchedulerParams {
            graduating_interval_days: 5,
            easy_graduating_interval_days: 2,
            ..SchedulerParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(SettingsError::InvalidEasyGraduatingInterval)
        );
    }

    #[test]
    fn with_max_cards_keeps_other_limits() {
        let settings = ReviewSettings::default().with_max_cards(3).unwrap();
        assert_eq!(settings.max_cards(), 3);
        assert_eq!(settings.max_new_cards(), 10);
        assert!(ReviewSettings::default().with_max_cards(0).is_err());
    }
}
