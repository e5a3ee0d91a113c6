//! Property-based tests for schedule combinators.

use effector::schedule::Schedule;
use proptest::prelude::*;
use rstest::rstest;
use std::time::Duration;

fn first_delays(schedule: &Schedule, limit: usize) -> Vec<Duration> {
    schedule.iter().take(limit).collect()
}

proptest! {
    /// take(n) never yields more than n delays.
    #[test]
    fn prop_take_bounds_length(interval in 0_u64..1_000, count in 0_usize..50) {
        let schedule = Schedule::spaced(Duration::from_millis(interval)).take(count);
        prop_assert_eq!(schedule.iter().count(), count);
    }

    /// max_delay caps every delay.
    #[test]
    fn prop_max_delay_caps(base in 1_u64..100, cap in 1_u64..10_000) {
        let cap = Duration::from_millis(cap);
        let schedule = Schedule::exponential(Duration::from_millis(base)).max_delay(cap);
        prop_assert!(schedule.iter().take(40).all(|delay| delay <= cap));
    }

    /// up_to never exceeds its cumulative budget.
    #[test]
    fn prop_up_to_respects_budget(interval in 1_u64..100, budget in 0_u64..2_000) {
        let budget = Duration::from_millis(budget);
        let schedule = Schedule::spaced(Duration::from_millis(interval)).up_to(budget);
        let total: Duration = schedule.iter().sum();
        prop_assert!(total <= budget);
    }

    /// Every run of a schedule yields the same sequence.
    #[test]
    fn prop_iter_is_repeatable(base in 1_u64..100, count in 0_usize..20) {
        let schedule = Schedule::fibonacci(Duration::from_millis(base)).take(count);
        prop_assert_eq!(first_delays(&schedule, 100), first_delays(&schedule, 100));
    }

    /// union is as long as the longer input; intersect as short as the shorter.
    #[test]
    fn prop_union_and_intersect_lengths(left in 0_usize..20, right in 0_usize..20) {
        let first = Schedule::spaced(Duration::from_millis(1)).take(left);
        let second = Schedule::spaced(Duration::from_millis(2)).take(right);
        prop_assert_eq!(first.clone().union(second.clone()).iter().count(), left.max(right));
        prop_assert_eq!(first.intersect(second).iter().count(), left.min(right));
    }

    /// then concatenates.
    #[test]
    fn prop_then_concatenates(left in 0_usize..20, right in 0_usize..20) {
        let chained = Schedule::recurs(left).then(Schedule::recurs(right));
        prop_assert_eq!(chained.iter().count(), left + right);
    }
}

#[rstest]
fn test_from_durations_preserves_order() {
    let delays = [3, 1, 2].map(Duration::from_millis);
    assert_eq!(first_delays(&Schedule::from_durations(delays), 10), delays.to_vec());
}

#[rstest]
fn test_schedule_is_shareable_across_threads() {
    let schedule = Schedule::linear(Duration::from_millis(1)).take(3);
    let cloned = schedule.clone();
    let counted = std::thread::spawn(move || cloned.iter().count())
        .join()
        .expect("thread");
    assert_eq!(counted, 3);
    assert_eq!(schedule.iter().count(), 3);
}
