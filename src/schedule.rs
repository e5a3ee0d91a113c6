//! Lazy, combinable delay schedules.
//!
//! A [`Schedule`] describes a possibly infinite sequence of delays. It is a
//! recipe rather than an iterator: every call to [`Schedule::iter`] starts a
//! fresh, independent sequence, so one schedule value can pace any number of
//! retry or repeat loops.
//!
//! # Examples
//!
//! ```rust
//! use effector::schedule::Schedule;
//! use std::time::Duration;
//!
//! let backoff = Schedule::exponential(Duration::from_millis(10))
//!     .max_delay(Duration::from_millis(50))
//!     .take(5);
//!
//! let delays: Vec<u64> = backoff.iter().map(|d| d.as_millis() as u64).collect();
//! assert_eq!(delays, vec![10, 20, 40, 50, 50]);
//! // A second run starts over.
//! assert_eq!(backoff.iter().count(), 5);
//! ```

use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

type Factory = Arc<dyn Fn() -> Delays + Send + Sync>;

/// One run of a [`Schedule`].
pub struct Delays(Box<dyn Iterator<Item = Duration> + Send>);

impl Iterator for Delays {
    type Item = Duration;

    #[inline]
    fn next(&mut self) -> Option<Duration> {
        self.0.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl fmt::Debug for Delays {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Delays").finish_non_exhaustive()
    }
}

/// A reusable recipe for a sequence of delays.
#[derive(Clone)]
pub struct Schedule {
    factory: Factory,
}

impl Schedule {
    fn from_factory<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Iterator<Item = Duration> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || Delays(Box::new(factory()))),
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Unlimited recurrences with no delay.
    pub fn forever() -> Self {
        Self::from_factory(|| iter::repeat(Duration::ZERO))
    }

    /// No recurrences at all.
    pub fn never() -> Self {
        Self::from_factory(iter::empty)
    }

    /// Exactly one recurrence with no delay.
    pub fn once() -> Self {
        Self::recurs(1)
    }

    /// `count` recurrences with no delay.
    pub fn recurs(count: usize) -> Self {
        Self::from_factory(move || iter::repeat_n(Duration::ZERO, count))
    }

    /// Unlimited recurrences, `interval` apart.
    pub fn spaced(interval: Duration) -> Self {
        Self::from_factory(move || iter::repeat(interval))
    }

    /// Exactly the given delays, in order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::schedule::Schedule;
    /// use std::time::Duration;
    ///
    /// let fixed = Schedule::from_durations([Duration::from_secs(1), Duration::from_secs(3)]);
    /// assert_eq!(fixed.iter().collect::<Vec<_>>(), vec![Duration::from_secs(1), Duration::from_secs(3)]);
    /// ```
    pub fn from_durations(delays: impl IntoIterator<Item = Duration>) -> Self {
        let delays: Arc<[Duration]> = delays.into_iter().collect();
        Self::from_factory(move || {
            let delays = Arc::clone(&delays);
            (0..delays.len()).map(move |index| delays[index])
        })
    }

    /// `base`, `2 * base`, `3 * base`, ...
    pub fn linear(base: Duration) -> Self {
        Self::from_factory(move || iter::successors(Some(base), move |delay| Some(delay.saturating_add(base))))
    }

    /// `base`, `2 * base`, `4 * base`, ...
    pub fn exponential(base: Duration) -> Self {
        Self::from_factory(move || iter::successors(Some(base), |delay| Some(delay.saturating_mul(2))))
    }

    /// `base`, `base`, `2 * base`, `3 * base`, `5 * base`, ...
    pub fn fibonacci(base: Duration) -> Self {
        Self::from_factory(move || {
            iter::successors(Some((base, base)), |&(current, next)| {
                Some((next, current.saturating_add(next)))
            })
            .map(|(current, _)| current)
        })
    }

    // =========================================================================
    // Combinators
    // =========================================================================

    /// At most `count` recurrences of this schedule.
    #[must_use]
    pub fn take(self, count: usize) -> Self {
        let factory = self.factory;
        Self::from_factory(move || factory().take(count))
    }

    /// Stops before the first delay for which `predicate` holds.
    #[must_use]
    pub fn until<P>(self, predicate: P) -> Self
    where
        P: Fn(Duration) -> bool + Send + Sync + 'static,
    {
        let factory = self.factory;
        let predicate = Arc::new(predicate);
        Self::from_factory(move || {
            let predicate = Arc::clone(&predicate);
            factory().take_while(move |delay| !predicate(*delay))
        })
    }

    /// Caps every delay at `cap`.
    #[must_use]
    pub fn max_delay(self, cap: Duration) -> Self {
        let factory = self.factory;
        Self::from_factory(move || factory().map(move |delay| delay.min(cap)))
    }

    /// Stops once the cumulative delay would exceed `budget`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::schedule::Schedule;
    /// use std::time::Duration;
    ///
    /// let budgeted = Schedule::spaced(Duration::from_millis(40)).up_to(Duration::from_millis(100));
    /// assert_eq!(budgeted.iter().count(), 2);
    /// ```
    #[must_use]
    pub fn up_to(self, budget: Duration) -> Self {
        let factory = self.factory;
        Self::from_factory(move || {
            factory()
                .scan(Duration::ZERO, move |elapsed, delay| {
                    *elapsed = elapsed.saturating_add(delay);
                    (*elapsed <= budget).then_some(delay)
                })
        })
    }

    /// Runs this schedule to exhaustion, then `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        let (first, second) = (self.factory, next.factory);
        Self::from_factory(move || first().chain(second()))
    }

    /// Recurs while either schedule does, using the shorter delay.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let (left, right) = (self.factory, other.factory);
        Self::from_factory(move || {
            let mut left = left().fuse();
            let mut right = right().fuse();
            iter::from_fn(move || match (left.next(), right.next()) {
                (Some(first), Some(second)) => Some(first.min(second)),
                (Some(only), None) | (None, Some(only)) => Some(only),
                (None, None) => None,
            })
        })
    }

    /// Recurs while both schedules do, using the longer delay.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let (left, right) = (self.factory, other.factory);
        Self::from_factory(move || left().zip(right()).map(|(first, second)| first.max(second)))
    }

    /// Starts a fresh run of this schedule.
    pub fn iter(&self) -> Delays {
        (self.factory)()
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Schedule").finish_non_exhaustive()
    }
}

impl IntoIterator for &Schedule {
    type Item = Duration;
    type IntoIter = Delays;

    fn into_iter(self) -> Delays {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn millis(schedule: &Schedule, limit: usize) -> Vec<u64> {
        schedule
            .iter()
            .take(limit)
            .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
            .collect()
    }

    #[rstest]
    fn test_never_is_empty() {
        assert_eq!(Schedule::never().iter().count(), 0);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(7)]
    fn test_recurs_yields_count_zero_delays(#[case] count: usize) {
        let delays: Vec<Duration> = Schedule::recurs(count).iter().collect();
        assert_eq!(delays, vec![Duration::ZERO; count]);
    }

    #[rstest]
    fn test_once_is_single_recurrence() {
        assert_eq!(Schedule::once().iter().count(), 1);
    }

    #[rstest]
    fn test_linear() {
        assert_eq!(millis(&Schedule::linear(Duration::from_millis(5)), 4), vec![5, 10, 15, 20]);
    }

    #[rstest]
    fn test_exponential() {
        assert_eq!(millis(&Schedule::exponential(Duration::from_millis(1)), 5), vec![1, 2, 4, 8, 16]);
    }

    #[rstest]
    fn test_fibonacci() {
        assert_eq!(
            millis(&Schedule::fibonacci(Duration::from_millis(1)), 7),
            vec![1, 1, 2, 3, 5, 8, 13]
        );
    }

    #[rstest]
    fn test_exponential_saturates() {
        let last = Schedule::exponential(Duration::from_secs(1)).iter().nth(200);
        assert_eq!(last, Some(Duration::MAX));
    }

    #[rstest]
    fn test_until_is_exclusive() {
        let schedule = Schedule::linear(Duration::from_millis(10)).until(|delay| delay >= Duration::from_millis(30));
        assert_eq!(millis(&schedule, 10), vec![10, 20]);
    }

    #[rstest]
    fn test_up_to_stops_at_budget() {
        let schedule = Schedule::spaced(Duration::from_millis(30)).up_to(Duration::from_millis(90));
        assert_eq!(millis(&schedule, 10), vec![30, 30, 30]);
    }

    #[rstest]
    fn test_then_chains() {
        let schedule = Schedule::spaced(Duration::from_millis(1))
            .take(2)
            .then(Schedule::spaced(Duration::from_millis(9)).take(1));
        assert_eq!(millis(&schedule, 10), vec![1, 1, 9]);
    }

    #[rstest]
    fn test_union_takes_minimum_and_longest() {
        let short = Schedule::spaced(Duration::from_millis(5)).take(2);
        let long = Schedule::spaced(Duration::from_millis(10)).take(4);
        assert_eq!(millis(&short.union(long), 10), vec![5, 5, 10, 10]);
    }

    #[rstest]
    fn test_intersect_takes_maximum_and_shortest() {
        let short = Schedule::spaced(Duration::from_millis(5)).take(2);
        let long = Schedule::spaced(Duration::from_millis(10)).take(4);
        assert_eq!(millis(&short.intersect(long), 10), vec![10, 10]);
    }

    #[rstest]
    fn test_each_iter_is_independent() {
        let schedule = Schedule::from_durations([Duration::from_millis(1), Duration::from_millis(2)]);
        let mut first = schedule.iter();
        assert_eq!(first.next(), Some(Duration::from_millis(1)));
        assert_eq!(millis(&schedule, 10), vec![1, 2]);
        assert_eq!(first.next(), Some(Duration::from_millis(2)));
    }
}
