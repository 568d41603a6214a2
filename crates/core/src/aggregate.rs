//! Session-end aggregation: compresses a session's rating log into a
//! `SessionSummary` and folds it into the learner's cumulative deck progress.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::{
    CardId, DeckProgress, ProgressBucket, RatingBreakdown, ReviewSession, SessionSummary,
    TransitionCounts,
};
use crate::time::days_between;

/// Result of aggregating a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub summary: SessionSummary,
    /// Buckets whose counter would have gone negative and were clamped to zero.
    ///
    /// Non-empty only when the stored progress disagrees with the card states.
    pub underflow: Vec<ProgressBucket>,
}

/// Summarize `session` and compute the deck progress after it.
///
/// `ended_at` is used when the session carries no end time of its own.
/// `due_today` replaces the stored counter; the caller recomputes it from the
/// catalog after the session's states have been written.
///
/// Only cards for which `in_deck` holds move the deck's bucket counters.
/// Ratings of other cards still count toward time, accuracy and the
/// breakdown.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(
    session: &ReviewSession,
    ended_at: DateTime<Utc>,
    due_today: u32,
    in_deck: impl Fn(CardId) -> bool,
) -> Aggregation {
    let ended_at = session
        .ended_at()
        .unwrap_or(ended_at)
        .max(session.started_at());
    let ratings = session.ratings();

    let breakdown: RatingBreakdown = ratings.iter().collect();
    let transitions: TransitionCounts = ratings
        .iter()
        .filter(|r| r.is_transition() && in_deck(r.card_id))
        .collect();
    let cards_reviewed = breakdown.total();
    let unique_cards = ratings
        .iter()
        .map(|r| r.card_id)
        .collect::<HashSet<_>>()
        .len();
    let total_time_secs: u64 = ratings.iter().map(|r| u64::from(r.time_spent_secs)).sum();

    let (accuracy, average_time_per_card_secs) = if cards_reviewed == 0 {
        (0.0, 0.0)
    } else {
        (
            f64::from(breakdown.correct()) / f64::from(cards_reviewed),
            total_time_secs as f64 / f64::from(cards_reviewed),
        )
    };

    let progress_before = session.progress_at_start().clone();
    let mut progress_after = progress_before.clone();
    let underflow = apply_transitions(&mut progress_after, &transitions);
    progress_after.due_today = due_today;
    progress_after.sessions_completed = progress_after.sessions_completed.saturating_add(1);
    progress_after.total_time_secs = progress_after.total_time_secs.saturating_add(total_time_secs);
    progress_after.total_reviews = progress_after
        .total_reviews
        .saturating_add(u64::from(cards_reviewed));
    progress_after.correct_reviews = progress_after
        .correct_reviews
        .saturating_add(u64::from(breakdown.correct()));
    update_streak(&mut progress_after, ended_at);

    let summary = SessionSummary {
        session_id: session.id(),
        user_id: session.user_id(),
        deck_id: session.deck_id(),
        started_at: session.started_at(),
        ended_at,
        duration_secs: session.elapsed_secs(ended_at),
        active_secs: session.active_secs(ended_at),
        cards_reviewed,
        unique_cards: u32::try_from(unique_cards).unwrap_or(u32::MAX),
        accuracy,
        total_time_secs,
        average_time_per_card_secs,
        breakdown,
        transitions,
        progress_before,
        progress_after,
    };

    Aggregation { summary, underflow }
}

/// Move card counts between buckets. Returns the buckets that were clamped.
pub fn apply_transitions(
    progress: &mut DeckProgress,
    transitions: &TransitionCounts,
) -> Vec<ProgressBucket> {
    let deltas = transitions.net_deltas();
    let mut clamped = Vec::new();
    for bucket in ProgressBucket::ALL {
        let slot = progress.bucket_mut(bucket);
        let next = i64::from(*slot) + deltas[bucket.index()];
        if next < 0 {
            clamped.push(bucket);
        }
        *slot = u32::try_from(next.max(0)).unwrap_or(u32::MAX);
    }
    clamped
}

/// Advance the study streak for a session ending at `studied_at`.
///
/// Calendar days in UTC: same day keeps the streak (at least 1), the next
/// day extends it, any longer gap restarts it at 1.
pub fn update_streak(progress: &mut DeckProgress, studied_at: DateTime<Utc>) {
    progress.streak = match progress.last_studied_at {
        None => 1,
        Some(last) => match days_between(last, studied_at) {
            // clock went backwards: treat as the same day
            ..=0 => progress.streak.max(1),
            1 => progress.streak.saturating_add(1),
            _ => 1,
        },
    };
    progress.longest_streak = progress.longest_streak.max(progress.streak);
    progress.last_studied_at = Some(
        progress
            .last_studied_at
            .map_or(studied_at, |last| last.max(studied_at)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CardId, CardState, DeckId, QueuedCard, Rating, RatingRecord, SchedulingState, SessionId,
        UserId,
    };
    use crate::scheduler::Scheduler;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn progress(new: u32, learning: u32, review: u32, mastered: u32) -> DeckProgress {
        DeckProgress {
            cards_new: new,
            cards_learning: learning,
            cards_review: review,
            cards_mastered: mastered,
            ..DeckProgress::default()
        }
    }

    fn session_with(states: &[(u64, SchedulingState)], start: DeckProgress) -> ReviewSession {
        let cards = states
            .iter()
            .map(|(id, s)| QueuedCard::new(CardId::new(*id), s.clone()))
            .collect();
        ReviewSession::start(
            SessionId::generate(),
            UserId::new(1),
            DeckId::new(1),
            cards,
            start,
            fixed_now(),
        )
        .unwrap()
    }

    fn rate(session: &mut ReviewSession, card: u64, rating: Rating, secs: u32) {
        let scheduler = Scheduler::new();
        let before = session.snapshot(CardId::new(card)).unwrap().clone();
        let after = scheduler.apply(&before, rating, fixed_now());
        let record = RatingRecord {
            card_id: CardId::new(card),
            rating,
            time_spent_secs: secs,
            reviewed_at: fixed_now(),
            state_before: before.card_state,
            state_after: after.card_state,
        };
        session.record_rating(record, after).unwrap();
    }

    fn review_state() -> SchedulingState {
        SchedulingState {
            card_state: CardState::Review,
            interval_days: 10,
            repetitions: 3,
            ..SchedulingState::new_card(fixed_now())
        }
    }

    #[test]
    fn zero_review_session_has_zero_average_and_accuracy() {
        let mut session = session_with(&[(1, SchedulingState::new_card(fixed_now()))], progress(1, 0, 0, 0));
        session.complete(fixed_now() + Duration::minutes(2)).unwrap();

        let agg = summarize(&session, fixed_now(), 1, |_| true);
        let summary = agg.summary;
        assert_eq!(summary.cards_reviewed(), 0);
        assert_eq!(summary.average_time_per_card_secs(), 0.0);
        assert_eq!(summary.accuracy(), 0.0);
        assert_eq!(summary.duration_secs(), 120);
        assert_eq!(summary.progress_after().sessions_completed, 1);
        assert_eq!(summary.progress_after().total_cards(), 1);
        assert!(agg.underflow.is_empty());
    }

    #[test]
    fn card_total_is_conserved() {
        let start = progress(2, 1, 1, 0);
        let learning = SchedulingState {
            card_state: CardState::Learning,
            interval_days: 1,
            repetitions: 1,
            ..SchedulingState::new_card(fixed_now())
        };
        let mut session = session_with(
            &[
                (1, SchedulingState::new_card(fixed_now())),
                (2, SchedulingState::new_card(fixed_now())),
                (3, learning),
                (4, review_state()),
            ],
            start.clone(),
        );
        rate(&mut session, 1, Rating::Good, 4); // new → learning
        rate(&mut session, 2, Rating::Easy, 2); // new → review
        rate(&mut session, 3, Rating::Good, 6); // learning → review
        rate(&mut session, 4, Rating::Again, 8); // review → relearning
        rate(&mut session, 4, Rating::Good, 3); // relearning → review
        session.complete(fixed_now()).unwrap();

        let agg = summarize(&session, fixed_now(), 0, |_| true);
        let summary = &agg.summary;
        let after = summary.progress_after();
        assert_eq!(after.total_cards(), start.total_cards());
        assert_eq!(after.cards_new, 0);
        assert_eq!(after.cards_learning, 1);
        assert_eq!(after.cards_review, 3);
        assert_eq!(after.cards_mastered, 0);
        assert!(agg.underflow.is_empty());

        let t = summary.transitions();
        assert_eq!(t.new_to_learning(), 1);
        assert_eq!(t.new_to_review(), 1);
        assert_eq!(t.learning_to_review(), 2);
        assert_eq!(t.to_relearning(), 1);

        assert_eq!(summary.cards_reviewed(), 5);
        assert_eq!(summary.unique_cards(), 4);
        assert_eq!(summary.breakdown().good, 3);
        assert_eq!(summary.total_time_secs(), 23);
        assert!((summary.average_time_per_card_secs() - 4.6).abs() < 1e-9);
        assert!((summary.accuracy() - 0.8).abs() < 1e-9);
        assert_eq!(after.total_reviews, 5);
        assert_eq!(after.correct_reviews, 4);
        assert_eq!(after.total_time_secs, 23);
    }

    #[test]
    fn inconsistent_progress_is_clamped_and_reported() {
        let mut session = session_with(&[(1, review_state())], progress(0, 0, 0, 0));
        rate(&mut session, 1, Rating::Again, 1);
        session.complete(fixed_now()).unwrap();

        let agg = summarize(&session, fixed_now(), 0, |_| true);
        assert_eq!(agg.underflow, vec![ProgressBucket::Review]);
        assert_eq!(agg.summary.progress_after().cards_review, 0);
        assert_eq!(agg.summary.progress_after().cards_learning, 1);
    }

    #[test]
    fn due_today_is_replaced() {
        let start = DeckProgress {
            due_today: 9,
            ..progress(1, 0, 0, 0)
        };
        let mut session = session_with(&[(1, SchedulingState::new_card(fixed_now()))], start);
        session.complete(fixed_now()).unwrap();
        let agg = summarize(&session, fixed_now(), 3, |_| true);
        assert_eq!(agg.summary.progress_after().due_today, 3);
    }

    #[test]
    fn cards_outside_the_deck_do_not_move_counters() {
        let mut session = session_with(&[(1, SchedulingState::new_card(fixed_now()))], progress(2, 0, 0, 0));
        let stray = SchedulingState::new_card(fixed_now());
        let after = Scheduler::new().apply(&stray, Rating::Good, fixed_now());
        let record = RatingRecord {
            card_id: CardId::new(10),
            rating: Rating::Good,
            time_spent_secs: 5,
            reviewed_at: fixed_now(),
            state_before: stray.card_state,
            state_after: after.card_state,
        };
        session.record_rating(record, after).unwrap();
        session.complete(fixed_now()).unwrap();

        let agg = summarize(&session, fixed_now(), 2, |id| id != CardId::new(10));
        let summary = &agg.summary;
        assert_eq!(summary.transitions().total_moves(), 0);
        assert_eq!(summary.progress_after().cards_new, 2);
        assert_eq!(summary.progress_after().cards_learning, 0);
        assert_eq!(summary.cards_reviewed(), 1);
        assert_eq!(summary.progress_after().total_reviews, 1);
    }

    #[test]
    fn streak_starts_at_one() {
        let mut p = DeckProgress::default();
        update_streak(&mut p, fixed_now());
        assert_eq!(p.streak, 1);
        assert_eq!(p.longest_streak, 1);
        assert_eq!(p.last_studied_at, Some(fixed_now()));
    }

    #[test]
    fn streak_same_day_is_unchanged() {
        let mut p = DeckProgress {
            streak: 4,
            longest_streak: 6,
            last_studied_at: Some(fixed_now()),
            ..DeckProgress::default()
        };
        update_streak(&mut p, fixed_now() + Duration::hours(1));
        assert_eq!(p.streak, 4);
        assert_eq!(p.longest_streak, 6);
    }

    #[test]
    fn streak_next_calendar_day_increments() {
        // 22:13 UTC; two hours later is the next calendar day
        let mut p = DeckProgress {
            streak: 6,
            longest_streak: 6,
            last_studied_at: Some(fixed_now()),
            ..DeckProgress::default()
        };
        update_streak(&mut p, fixed_now() + Duration::hours(2));
        assert_eq!(p.streak, 7);
        assert_eq!(p.longest_streak, 7);
    }

    #[test]
    fn streak_gap_resets() {
        let mut p = DeckProgress {
            streak: 5,
            longest_streak: 5,
            last_studied_at: Some(fixed_now()),
            ..DeckProgress::default()
        };
        update_streak(&mut p, fixed_now() + Duration::days(3));
        assert_eq!(p.streak, 1);
        assert_eq!(p.longest_streak, 5);
    }

    #[test]
    fn streak_ignores_clock_going_backwards() {
        let later = fixed_now() + Duration::days(2);
        let mut p = DeckProgress {
            streak: 3,
            longest_streak: 3,
            last_studied_at: Some(later),
            ..DeckProgress::default()
        };
        update_streak(&mut p, fixed_now());
        assert_eq!(p.streak, 3);
        assert_eq!(p.last_studied_at, Some(later));
    }
}
