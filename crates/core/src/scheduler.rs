use chrono::{DateTime, Utc};

use crate::model::{CardState, Rating, SchedulerParams, SchedulingState, SettingsError};
use crate::time::add_days;

/// Upper bound on any interval so due dates stay representable.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

//
// ─── SCHEDULED STATES ──────────────────────────────────────────────────────────
//

/// All four possible next states for a card, one per rating.
///
/// Used to show "next review in N days" on the answer buttons before the
/// learner commits to a rating.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStates {
    pub again: SchedulingState,
    pub hard: SchedulingState,
    pub good: SchedulingState,
    pub easy: SchedulingState,
}

impl ScheduledStates {
    #[must_use]
    pub fn select(&self, rating: Rating) -> &SchedulingState {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SM-2 family scheduler.
///
/// `apply` is pure and total: every `(state, rating)` pair yields a valid
/// state. Ease never drops below the configured floor, `Good`/`Easy` never
/// shrink a reviewed card's interval, `Mastered` is only entered from
/// `Review`, and `Again` on a graduated card always lands in `Relearning`.
///
/// # Examples
///
/// ```
/// # use srs_core::scheduler::Scheduler;
/// # use srs_core::model::{CardState, Rating, SchedulingState};
/// let scheduler = Scheduler::new();
/// let now = srs_core::time::fixed_now();
///
/// let first = scheduler.apply(&SchedulingState::new_card(now), Rating::Good, now);
/// assert_eq!(first.card_state, CardState::Learning);
/// assert_eq!(first.interval_days, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    /// Scheduler with the default SM-2 constants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler with custom parameters.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the parameters would break the scheduler's invariants.
    pub fn with_params(params: SchedulerParams) -> Result<Self, SettingsError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[must_use]
    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Apply a rating given at `now` and return the card's next state.
    #[must_use]
    pub fn apply(&self, state: &SchedulingState, rating: Rating, now: DateTime<Utc>) -> SchedulingState {
        let p = &self.params;
        let ease = self.sanitized_ease(state.ease_factor);
        let previous = state.interval_days.min(MAX_INTERVAL_DAYS);

        let mut next = state.clone();
        match rating {
            Rating::Again => {
                if state.card_state.is_graduated() {
                    next.card_state = CardState::Relearning;
                    next.lapses = state.lapses.saturating_add(1);
                } else {
                    next.card_state = CardState::Learning;
                }
                next.repetitions = 0;
                next.interval_days = p.relearn_step_days.min(MAX_INTERVAL_DAYS);
                next.ease_factor = self.floor(ease - p.again_ease_penalty);
            }
            Rating::Hard => {
                next.interval_days = scale(previous, p.hard_interval_multiplier).max(1);
                next.repetitions = state.repetitions.saturating_add(1);
                next.ease_factor = self.floor(ease - p.hard_ease_penalty);
                if matches!(state.card_state, CardState::New | CardState::Learning) {
                    next.card_state = CardState::Learning;
                }
            }
            Rating::Good => {
                let grown = if state.repetitions > 0 {
                    scale(previous, ease)
                } else {
                    p.graduating_interval_days
                };
                next.interval_days = grown.max(previous).clamp(1, MAX_INTERVAL_DAYS);
                next.repetitions = state.repetitions.saturating_add(1);
                next.ease_factor = ease;
                next.card_state = match state.card_state {
                    CardState::New => CardState::Learning,
                    CardState::Learning | CardState::Relearning => CardState::Review,
                    CardState::Review => self.review_or_mastered(&next),
                    CardState::Mastered => CardState::Mastered,
                };
            }
            Rating::Easy => {
                let grown = if state.repetitions > 0 {
                    scale(previous, ease * p.easy_interval_bonus)
                } else {
                    p.easy_graduating_interval_days
                };
                next.interval_days = grown.max(previous).clamp(1, MAX_INTERVAL_DAYS);
                next.repetitions = state.repetitions.saturating_add(1);
                next.ease_factor = ease + p.easy_ease_bonus;
                next.card_state = match state.card_state {
                    CardState::New | CardState::Learning | CardState::Relearning => {
                        CardState::Review
                    }
                    CardState::Review => self.review_or_mastered(&next),
                    CardState::Mastered => CardState::Mastered,
                };
            }
        }

        next.last_reviewed_at = Some(now);
        next.due_at = add_days(now, next.interval_days);
        next
    }

    /// Compute the outcome of every rating without committing to one.
    #[must_use]
    pub fn preview(&self, state: &SchedulingState, now: DateTime<Utc>) -> ScheduledStates {
        ScheduledStates {
            again: self.apply(state, Rating::Again, now),
            hard: self.apply(state, Rating::Hard, now),
            good: self.apply(state, Rating::Good, now),
            easy: self.apply(state, Rating::Easy, now),
        }
    }

    fn review_or_mastered(&self, next: &SchedulingState) -> CardState {
        if next.interval_days >= self.params.mastery_interval_days
            || next.repetitions >= self.params.mastery_repetitions
        {
            CardState::Mastered
        } else {
            CardState::Review
        }
    }

    fn floor(&self, ease: f64) -> f64 {
        ease.max(self.params.ease_floor)
    }

    // Stored states come from outside; a corrupt ease must not poison the schedule.
    fn sanitized_ease(&self, ease: f64) -> f64 {
        if ease.is_finite() {
            self.floor(ease)
        } else {
            self.params.initial_ease
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale(interval: u32, factor: f64) -> u32 {
    let scaled = (f64::from(interval) * factor).round();
    if scaled >= f64::from(MAX_INTERVAL_DAYS) {
        MAX_INTERVAL_DAYS
    } else if scaled <= 0.0 {
        0
    } else {
        scaled as u32
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MIN_EASE_FACTOR;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn state(card_state: CardState, ease: f64, interval: u32, reps: u32) -> SchedulingState {
        SchedulingState {
            card_state,
            ease_factor: ease,
            interval_days: interval,
            repetitions: reps,
            lapses: 0,
            due_at: fixed_now(),
            last_reviewed_at: Some(fixed_now()),
        }
    }

    /// Every rating sequence of the given length, in lexicographic order.
    fn sequences(len: u32) -> impl Iterator<Item = Vec<Rating>> {
        (0..4_usize.pow(len)).map(move |mut n| {
            (0..len)
                .map(|_| {
                    let r = Rating::ALL[n % 4];
                    n /= 4;
                    r
                })
                .collect()
        })
    }

    #[test]
    fn new_card_three_sessions() {
        let s = Scheduler::new();
        let day0 = fixed_now();

        let first = s.apply(&SchedulingState::new_card(day0), Rating::Good, day0);
        assert_eq!(first.card_state, CardState::Learning);
        assert_eq!(first.repetitions, 1);
        assert_eq!(first.interval_days, 1);
        assert_eq!(first.due_at, day0 + Duration::days(1));

        let day1 = day0 + Duration::days(1);
        let second = s.apply(&first, Rating::Good, day1);
        assert_eq!(second.card_state, CardState::Review);
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval_days, 3);
        assert_eq!(second.last_reviewed_at, Some(day1));

        let day4 = day1 + Duration::days(3);
        let third = s.apply(&second, Rating::Again, day4);
        assert_eq!(third.card_state, CardState::Relearning);
        assert_eq!(third.repetitions, 0);
        assert_eq!(third.interval_days, 0);
        assert!((third.ease_factor - 2.30).abs() < 1e-9);
        assert_eq!(third.lapses, 1);
        assert_eq!(third.due_at, day4);
    }

    #[test]
    fn again_from_mastered_demotes() {
        let s = Scheduler::new();
        let mastered = state(CardState::Mastered, 2.5, 40, 9);
        let next = s.apply(&mastered, Rating::Again, fixed_now());
        assert_eq!(next.card_state, CardState::Relearning);
        assert_eq!(next.interval_days, 0);
        assert_eq!(next.repetitions, 0);
    }

    #[test]
    fn again_before_graduation_stays_in_learning() {
        let s = Scheduler::new();
        let next = s.apply(&SchedulingState::new_card(fixed_now()), Rating::Again, fixed_now());
        assert_eq!(next.card_state, CardState::Learning);
        assert_eq!(next.lapses, 0);
    }

    #[test]
    fn hard_grows_slowly_and_penalizes_ease() {
        let s = Scheduler::new();
        let next = s.apply(&state(CardState::Review, 2.5, 10, 3), Rating::Hard, fixed_now());
        assert_eq!(next.interval_days, 12);
        assert!((next.ease_factor - 2.35).abs() < 1e-9);
        assert_eq!(next.repetitions, 4);
        assert_eq!(next.card_state, CardState::Review);

        let from_new = s.apply(&SchedulingState::new_card(fixed_now()), Rating::Hard, fixed_now());
        assert_eq!(from_new.interval_days, 1);
        assert_eq!(from_new.card_state, CardState::Learning);
    }

    #[test]
    fn easy_applies_bonus_and_skips_learning() {
        let s = Scheduler::new();
        let from_new = s.apply(&SchedulingState::new_card(fixed_now()), Rating::Easy, fixed_now());
        assert_eq!(from_new.card_state, CardState::Review);
        assert_eq!(from_new.interval_days, 4);
        assert!((from_new.ease_factor - 2.65).abs() < 1e-9);

        // round(10 * 2.5 * 1.3) = 33 >= 21 → mastered
        let next = s.apply(&state(CardState::Review, 2.5, 10, 3), Rating::Easy, fixed_now());
        assert_eq!(next.interval_days, 33);
        assert_eq!(next.card_state, CardState::Mastered);
    }

    #[test]
    fn good_promotes_review_to_mastered_past_threshold() {
        let s = Scheduler::new();
        let next = s.apply(&state(CardState::Review, 2.5, 8, 3), Rating::Good, fixed_now());
        assert_eq!(next.interval_days, 20);
        assert_eq!(next.card_state, CardState::Review);

        let next = s.apply(&next, Rating::Good, fixed_now());
        assert_eq!(next.interval_days, 50);
        assert_eq!(next.card_state, CardState::Mastered);

        let by_reps = s.apply(&state(CardState::Review, 1.3, 2, 7), Rating::Good, fixed_now());
        assert_eq!(by_reps.repetitions, 8);
        assert_eq!(by_reps.card_state, CardState::Mastered);
    }

    #[test]
    fn ease_floor_holds_for_all_sequences() {
        let s = Scheduler::new();
        for seq in sequences(6) {
            let mut current = SchedulingState::new_card(fixed_now());
            for rating in seq {
                current = s.apply(&current, rating, fixed_now());
                assert!(current.ease_factor >= MIN_EASE_FACTOR);
            }
        }
    }

    #[test]
    fn good_and_easy_never_shrink_reviewed_intervals() {
        let s = Scheduler::new();
        for seq in sequences(6) {
            let mut current = SchedulingState::new_card(fixed_now());
            for rating in seq {
                let next = s.apply(&current, rating, fixed_now());
                if rating.is_correct() && current.repetitions > 0 {
                    assert!(next.interval_days >= current.interval_days);
                }
                current = next;
            }
        }
    }

    #[test]
    fn mastered_and_relearning_reachability() {
        let s = Scheduler::new();
        for seq in sequences(7) {
            let mut current = SchedulingState::new_card(fixed_now());
            for rating in seq {
                let next = s.apply(&current, rating, fixed_now());
                let before = current.card_state;
                let after = next.card_state;
                if after == CardState::Mastered && before != CardState::Mastered {
                    assert_eq!(before, CardState::Review);
                }
                if after == CardState::Relearning && before != CardState::Relearning {
                    assert_eq!(rating, Rating::Again);
                    assert!(before.is_graduated());
                }
                current = next;
            }
        }
    }

    #[test]
    fn corrupt_ease_is_sanitized() {
        let s = Scheduler::new();
        let next = s.apply(&state(CardState::Review, f64::NAN, 5, 2), Rating::Good, fixed_now());
        assert!((next.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(next.interval_days, 13);

        let next = s.apply(&state(CardState::Review, 0.5, 5, 2), Rating::Good, fixed_now());
        assert!((next.ease_factor - MIN_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn huge_intervals_are_capped() {
        let s = Scheduler::new();
        let next = s.apply(
            &state(CardState::Mastered, 2.5, u32::MAX, 50),
            Rating::Easy,
            fixed_now(),
        );
        assert_eq!(next.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn preview_matches_apply() {
        let s = Scheduler::new();
        let current = state(CardState::Review, 2.2, 6, 2);
        let preview = s.preview(&current, fixed_now());
        for rating in Rating::ALL {
            assert_eq!(preview.select(rating), &s.apply(&current, rating, fixed_now()));
        }
        assert!(preview.again.interval_days <= preview.hard.interval_days);
        assert!(preview.hard.interval_days <= preview.good.interval_days);
        assert!(preview.good.interval_days <= preview.easy.interval_days);
    }

    #[test]
    fn with_params_validates() {
        let bad = SchedulerParams {
            ease_floor: 0.0,
            ..SchedulerParams::default()
        };
        assert!(Scheduler::with_params(bad).is_err());
        let ok = SchedulerParams {
            relearn_step_days: 1,
            ..SchedulerParams::default()
        };
        let s = Scheduler::with_params(ok).unwrap();
        let next = s.apply(&state(CardState::Review, 2.5, 10, 3), Rating::Again, fixed_now());
        assert_eq!(next.interval_days, 1);
    }
}
