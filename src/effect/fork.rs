//! Forking effects onto dedicated threads.
//!
//! [`Effect::fork`] starts an effect on its own named OS thread and returns
//! a [`ForkHandle`] for cancelling it and awaiting its result.
//!
//! # Resource Handoff
//!
//! The fork's environment sees the parent's resources without owning them
//! and tracks its own acquisitions separately:
//!
//! - on failure the fork releases what it acquired before publishing the
//!   error;
//! - on success its registry travels with the value and is merged into the
//!   first environment that joins;
//! - a successful result nobody joins releases its resources when the last
//!   handle is dropped.

use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use super::computation::{Node, unerase};
use super::{Effect, Error, interpreter};
use crate::env::{CancellationSignal, Env, ResourceRegistry};
use crate::runtime::{self, Completion};

static NEXT_FORK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForkId(u64);

impl ForkId {
    fn next() -> Self {
        Self(NEXT_FORK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "fork#{}", self.0)
    }
}

/// Raised by [`ForkHandle::join`] when the fork was cancelled through its
/// handle or by its timeout while the joining environment was not.
///
/// It travels as an [`Error::Failure`], so handlers and retry loops can
/// recover from it like any other failure.
///
/// # Examples
///
/// ```rust
/// use effector::effect::{Effect, ForkCancelled};
/// use std::time::Duration;
///
/// let joined = Effect::sleep(Duration::from_secs(5))
///     .fork(Some(Duration::from_millis(10)))
///     .flat_map(|handle| handle.join())
///     .attempt()
///     .run()
///     .unwrap();
///
/// let failure = joined.unwrap_err();
/// let cancelled = failure
///     .as_failure()
///     .and_then(|failure| failure.downcast_ref::<ForkCancelled>());
/// assert!(cancelled.is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkCancelled {
    id: ForkId,
}

impl ForkCancelled {
    /// Returns the id of the cancelled fork.
    pub const fn id(&self) -> ForkId {
        self.id
    }
}

impl fmt::Display for ForkCancelled {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} was cancelled before it completed", self.id)
    }
}

impl std::error::Error for ForkCancelled {}

type Outcome<A> = Result<(A, ResourceRegistry), Error>;

/// Handle to a running fork.
///
/// Handles are cheap to clone; every clone controls the same fork.
pub struct ForkHandle<A> {
    id: ForkId,
    signal: CancellationSignal,
    completion: Completion<Outcome<A>>,
}

impl<A: Clone + Send + Sync + 'static> ForkHandle<A> {
    /// Returns the fork's id.
    pub const fn id(&self) -> ForkId {
        self.id
    }

    /// Returns `true` once the fork has published its outcome.
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    /// An effect that cancels the fork.
    ///
    /// Cancelling twice, or cancelling a finished fork, does nothing.
    pub fn cancel(&self) -> Effect<()> {
        let signal = self.signal.clone();
        Effect::with_env(move |_| {
            if signal.cancel() {
                tracing::debug!("fork cancelled by handle");
            }
            Ok(())
        })
    }

    /// An effect that waits for the fork and yields its value or raises
    /// its error.
    ///
    /// Raises [`Error::Cancelled`] if the joining environment is cancelled
    /// while waiting; the fork keeps running. A fork that was cancelled on
    /// its own, through [`ForkHandle::cancel`] or its timeout, raises a
    /// recoverable [`ForkCancelled`] failure instead.
    pub fn join(&self) -> Effect<A> {
        let completion = self.completion.clone();
        let id = self.id;
        Effect::with_env(move |env| {
            let joined = completion.wait_with(env.signal(), |outcome| match outcome {
                Ok((value, resources)) => Ok((value.clone(), mem::take(resources))),
                Err(error) => Err(error.clone()),
            })?;
            let (value, resources) = match joined {
                Err(Error::Cancelled) if !env.is_cancelled() => {
                    return Err(Error::from_error(ForkCancelled { id }));
                }
                joined => joined?,
            };
            if !resources.is_empty() {
                tracing::debug!(fork = %id, resources = resources.len(), "adopting fork resources");
            }
            resources.merge_into(env.resources_mut());
            Ok(value)
        })
    }
}

impl<A> Clone for ForkHandle<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            signal: self.signal.clone(),
            completion: self.completion.clone(),
        }
    }
}

impl<A> fmt::Debug for ForkHandle<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ForkHandle")
            .field("id", &self.id)
            .field("completion", &self.completion)
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> Effect<A> {
    /// Starts this effect on a dedicated thread.
    ///
    /// The fork runs under a child of the current cancellation signal:
    /// cancelling the parent cancels the fork, never the reverse. With a
    /// `timeout` the fork is cancelled automatically once it elapses.
    ///
    /// # Errors
    ///
    /// The returned effect fails only if the thread cannot be spawned.
    /// Failures inside the fork, panics included, surface through
    /// [`ForkHandle::join`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// let program = Effect::lift(|| 6 * 7)
    ///     .fork(None)
    ///     .flat_map(|handle| handle.join());
    /// assert_eq!(program.run(), Ok(42));
    /// ```
    pub fn fork(self, timeout: Option<Duration>) -> Effect<ForkHandle<A>> {
        let body = self.into_link();
        Effect::with_env(move |env| spawn(body.node(), env, timeout))
    }
}

fn spawn<A>(body: Node, parent: &Env, timeout: Option<Duration>) -> Result<ForkHandle<A>, Error>
where
    A: Send + 'static,
{
    let id = ForkId::next();
    let mut env = parent.fork();
    let deadline = timeout.map(|timeout| env.cancel_after(timeout));
    let signal = env.signal().clone();
    let (completer, completion) = Completion::pair();

    let settings = runtime::config();
    let mut builder = thread::Builder::new().name(format!("{}-{}", settings.fork_thread_prefix(), id.0));
    if let Some(bytes) = settings.fork_stack_size() {
        builder = builder.stack_size(bytes);
    }

    tracing::debug!(fork = %id, ?timeout, "spawning fork");
    builder.spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| interpreter::drive(body, &mut env)))
            .unwrap_or_else(|panic| Err(Error::from_panic(panic)))
            .and_then(unerase::<A>);
        if let Some(deadline) = deadline {
            deadline.disarm();
        }
        match outcome {
            Ok(value) => {
                tracing::debug!(fork = %id, "fork completed");
                completer.complete(Ok((value, env.into_resources())));
            }
            Err(error) => {
                if matches!(error, Error::Panicked(_)) {
                    tracing::warn!(fork = %id, %error, "fork panicked");
                } else {
                    tracing::debug!(fork = %id, %error, "fork failed");
                }
                if let Err(release_error) = env.release() {
                    tracing::warn!(fork = %id, error = %release_error, "failed to release fork resources");
                }
                completer.complete(Err(error));
            }
        }
    })?;

    Ok(ForkHandle {
        id,
        signal,
        completion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_fork_id_display() {
        let id = ForkId::next();
        assert!(id.to_string().starts_with("fork#"));
    }

    #[rstest]
    fn test_fork_runs_on_named_thread() {
        let program = Effect::lift(|| thread::current().name().map(str::to_owned))
            .fork(None)
            .flat_map(|handle| handle.join());
        let name = program.run().unwrap().unwrap_or_default();
        assert!(name.starts_with(runtime::config().fork_thread_prefix()));
    }

    #[rstest]
    fn test_join_twice_returns_same_value() {
        let mut env = Env::new();
        let handle = Effect::pure(5).fork(None).run_with(&mut env).unwrap();
        assert_eq!(handle.join().run_with(&mut env), Ok(5));
        assert_eq!(handle.join().run_with(&mut env), Ok(5));
        assert!(handle.is_complete());
    }

    #[rstest]
    fn test_finished_fork_disarms_its_timeout() {
        let mut env = Env::new();
        let handle = Effect::pure(5)
            .fork(Some(Duration::from_millis(30)))
            .run_with(&mut env)
            .unwrap();
        assert_eq!(handle.join().run_with(&mut env), Ok(5));
        assert!(!handle.signal.wait_timeout(Duration::from_millis(100)));
    }

    #[rstest]
    fn test_join_of_timed_out_fork_is_a_failure() {
        let mut env = Env::new();
        let handle = Effect::sleep(Duration::from_secs(5))
            .fork(Some(Duration::from_millis(10)))
            .run_with(&mut env)
            .unwrap();
        let error = handle.join().run_with(&mut env).unwrap_err();
        assert!(!error.is_cancelled());
        assert_eq!(error, Error::from_error(ForkCancelled { id: handle.id() }));
        assert!(!env.is_cancelled());
    }

    #[rstest]
    fn test_panic_surfaces_at_join() {
        let mut env = Env::new();
        let handle = Effect::<i32>::lift(|| panic!("fork exploded"))
            .fork(None)
            .run_with(&mut env)
            .unwrap();
        assert_eq!(
            handle.join().run_with(&mut env),
            Err(Error::Panicked("fork exploded".to_string()))
        );
    }
}
