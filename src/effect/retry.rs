//! Schedule-driven retry and repeat.
//!
//! Both loops run every iteration in its own child scope and wait between
//! iterations with a cancellable sleep whose durations come from a fresh
//! [`Schedule`] iterator. The schedule bounds the number of *additional*
//! runs: a schedule yielding N delays allows at most N + 1 runs.

use std::sync::Arc;
use std::time::Duration;

use super::computation::Node;
use super::scope::{release, settle};
use super::{Effect, Error, interpreter};
use crate::env::Env;
use crate::schedule::Schedule;

/// Sleeps for `delay`, raising [`Error::Cancelled`] if `env` is cancelled
/// first.
fn wait(env: &Env, delay: Duration) -> Result<(), Error> {
    if env.signal().wait_timeout(delay) {
        return Err(Error::Cancelled);
    }
    Ok(())
}

impl<A: Send + 'static> Effect<A> {
    /// Re-runs this effect after failures, pacing attempts with `schedule`.
    ///
    /// Each attempt runs in a child scope. A failed attempt's resources are
    /// released before deciding what to do next; a successful attempt's
    /// resources are handed to the parent. The error is raised immediately
    /// when `is_fatal(&error)` holds or the error is a cancellation, and the
    /// last error is raised once the schedule is exhausted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    /// use effector::schedule::Schedule;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::time::Duration;
    ///
    /// let attempts = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&attempts);
    /// let flaky = Effect::try_lift(move || {
    ///     if counter.fetch_add(1, Ordering::SeqCst) < 2 {
    ///         Err(Error::failure("not yet"))
    ///     } else {
    ///         Ok("ready")
    ///     }
    /// });
    ///
    /// let schedule = Schedule::spaced(Duration::from_millis(1)).take(5);
    /// assert_eq!(flaky.retry_until(schedule, |_| false).run(), Ok("ready"));
    /// assert_eq!(attempts.load(Ordering::SeqCst), 3);
    /// ```
    pub fn retry_until<P>(self, schedule: Schedule, is_fatal: P) -> Self
    where
        P: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        let body = self.into_link();
        Self::from_node(Node::Sync(Arc::new(move |env| {
            let mut delays = schedule.iter();
            let mut attempt = 1_usize;
            loop {
                let mut scope = env.local();
                let outcome = interpreter::drive(body.node(), &mut scope);
                let error = match settle(scope, env, outcome) {
                    Ok(value) => return Ok(value),
                    Err(error) => error,
                };
                if error.is_cancelled() || is_fatal(&error) {
                    return Err(error);
                }
                let Some(delay) = delays.next() else {
                    tracing::trace!(attempt, %error, "retry schedule exhausted");
                    return Err(error);
                };
                tracing::trace!(attempt, ?delay, %error, "retrying failed effect");
                wait(env, delay)?;
                attempt += 1;
            }
        })))
    }

    /// Retries every failure except cancellation.
    pub fn retry(self, schedule: Schedule) -> Self {
        self.retry_until(schedule, |_| false)
    }

    /// Retries while `should_retry(&error)` holds.
    pub fn retry_while<P>(self, schedule: Schedule, should_retry: P) -> Self
    where
        P: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_until(schedule, move |error| !should_retry(error))
    }

    /// Re-runs this effect until `predicate(&result)` holds or `schedule` is
    /// exhausted, and returns the last result.
    ///
    /// Each iteration runs in a child scope that is released when the
    /// iteration ends, so nothing accumulates across iterations. An error
    /// stops the loop and is raised after the failing iteration's release.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    /// use effector::schedule::Schedule;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let tick = {
    ///     let counter = Arc::clone(&counter);
    ///     Effect::lift(move || counter.fetch_add(1, Ordering::SeqCst) + 1)
    /// };
    ///
    /// let reached = tick.repeat_until(Schedule::forever(), |count| *count == 4);
    /// assert_eq!(reached.run(), Ok(4));
    /// ```
    pub fn repeat_until<P>(self, schedule: Schedule, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let body = self.into_link();
        Self::from_node(Node::Sync(Arc::new(move |env| {
            let mut delays = schedule.iter();
            let mut iteration = 1_usize;
            loop {
                let mut scope = env.local();
                let outcome = interpreter::drive(body.node(), &mut scope);
                let value = release(scope, outcome)?;
                let done = match value.downcast_ref::<A>() {
                    Some(result) => predicate(result),
                    None => return Err(Error::Bottom("effect produced a value of an unexpected type")),
                };
                if done {
                    return Ok(value);
                }
                let Some(delay) = delays.next() else {
                    tracing::trace!(iteration, "repeat schedule exhausted");
                    return Ok(value);
                };
                tracing::trace!(iteration, ?delay, "repeating effect");
                wait(env, delay)?;
                iteration += 1;
            }
        })))
    }

    /// Repeats until `schedule` is exhausted.
    pub fn repeat(self, schedule: Schedule) -> Self {
        self.repeat_until(schedule, |_| false)
    }

    /// Repeats while `predicate(&result)` holds.
    pub fn repeat_while<P>(self, schedule: Schedule, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.repeat_until(schedule, move |result| !predicate(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_counter(counter: &Arc<AtomicUsize>) -> Effect<i32> {
        let counter = Arc::clone(counter);
        Effect::try_lift(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(Error::failure("always"))
        })
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(3, 4)]
    fn test_retry_runs_schedule_length_plus_one(#[case] delays: usize, #[case] expected: usize) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let effect = failing_counter(&attempts).retry(Schedule::recurs(delays));
        assert_eq!(effect.run(), Err(Error::failure("always")));
        assert_eq!(attempts.load(Ordering::SeqCst), expected);
    }

    #[rstest]
    fn test_fatal_error_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let effect = failing_counter(&attempts).retry_until(Schedule::forever(), |_| true);
        assert_eq!(effect.run(), Err(Error::failure("always")));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_retry_while_stops_when_predicate_fails() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let effect = failing_counter(&attempts).retry_while(Schedule::forever(), |_| false);
        assert!(effect.run().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_cancellation_is_never_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let effect = Effect::with_env(move |env| {
            counter.fetch_add(1, Ordering::SeqCst);
            env.cancel();
            env.check_cancelled()
        })
        .retry(Schedule::forever());
        assert_eq!(effect.run(), Err(Error::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_repeat_returns_last_value_when_exhausted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&counter);
        let effect = Effect::lift(move || observed.fetch_add(1, Ordering::SeqCst))
            .repeat(Schedule::recurs(4));
        assert_eq!(effect.run(), Ok(4));
    }

    #[rstest]
    fn test_repeat_while_stops_on_first_false() {
        let counter = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&counter);
        let effect = Effect::lift(move || observed.fetch_add(1, Ordering::SeqCst))
            .repeat_while(Schedule::forever(), |count| *count < 2);
        assert_eq!(effect.run(), Ok(2));
    }

    #[rstest]
    fn test_repeat_raises_iteration_error() {
        let effect = Effect::<i32>::fail("broken").repeat(Schedule::forever());
        assert_eq!(effect.run(), Err(Error::failure("broken")));
    }

    #[rstest]
    fn test_wait_is_cancellable() {
        let env = Env::new();
        env.cancel();
        assert_eq!(wait(&env, Duration::from_secs(30)), Err(Error::Cancelled));
    }
}
