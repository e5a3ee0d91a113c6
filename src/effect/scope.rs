//! Resource scopes: `local`, `bracket`, `bracket_with` and `finally`.
//!
//! Every scoped combinator evaluates its body against a child [`Env`] and
//! then ends that child in one of two ways:
//!
//! - **merge**: the parent takes ownership of everything the body acquired;
//! - **release**: everything the body acquired is disposed.
//!
//! Finalizers run against a detached environment, so a cancelled scope
//! still cleans up.

use std::sync::Arc;

use super::computation::{Node, Value, unerase};
use super::{Effect, Error, interpreter};
use crate::env::Env;

// =============================================================================
// Scope Teardown
// =============================================================================

/// Releases `scope`, then returns `outcome`.
///
/// A release failure replaces a successful outcome. When the outcome is
/// already a failure, the release failure is logged and the original error
/// wins.
pub(crate) fn release<A>(scope: Env, outcome: Result<A, Error>) -> Result<A, Error> {
    if !scope.resources().is_empty() {
        tracing::debug!(
            resources = scope.resources().len(),
            failed = outcome.is_err(),
            "releasing scope"
        );
    }
    let released = scope.release();
    match outcome {
        Ok(value) => released.map(|()| value),
        Err(error) => {
            if let Err(release_error) = released {
                tracing::warn!(
                    error = %release_error,
                    cause = %error,
                    "release failed while unwinding a failed scope"
                );
            }
            Err(error)
        }
    }
}

/// Merges `scope` into `parent` on success, releases it on failure.
pub(crate) fn settle<A>(scope: Env, parent: &mut Env, outcome: Result<A, Error>) -> Result<A, Error> {
    match outcome {
        Ok(value) => {
            scope.merge_into(parent);
            Ok(value)
        }
        Err(error) => release(scope, Err(error)),
    }
}

/// Runs `cleanup` to completion in a detached scope derived from `env`.
fn run_detached(cleanup: Node, env: &Env) -> Result<Value, Error> {
    let mut detached = env.detached();
    let outcome = interpreter::drive(cleanup, &mut detached);
    release(detached, outcome)
}

// =============================================================================
// Scoped Combinators
// =============================================================================

impl<A: Send + 'static> Effect<A> {
    /// Runs this effect in a child scope.
    ///
    /// On success the parent takes ownership of everything the effect
    /// acquired; on failure it is all released before the error propagates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    /// use effector::env::{Disposer, Env};
    ///
    /// let acquire = Effect::acquire(|| Ok(Disposer::new(|| Ok(()))));
    ///
    /// let mut env = Env::new();
    /// acquire.clone().local().run_with(&mut env).unwrap();
    /// assert_eq!(env.resources().len(), 1);
    ///
    /// let failing = acquire.then(Effect::<()>::fail("boom")).local();
    /// assert!(failing.run_with(&mut env).is_err());
    /// assert_eq!(env.resources().len(), 1);
    /// ```
    pub fn local(self) -> Self {
        let body = self.into_link();
        Self::from_node(Node::Sync(Arc::new(move |env| {
            let mut scope = env.local();
            let outcome = interpreter::drive(body.node(), &mut scope);
            settle(scope, env, outcome)
        })))
    }

    /// Runs this effect in a private scope whose resources are released
    /// when it ends, on every exit path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    /// use effector::env::{Disposer, Env};
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    ///
    /// let closed = Arc::new(AtomicBool::new(false));
    /// let flag = Arc::clone(&closed);
    /// let open = Effect::acquire(move || {
    ///     let flag = Arc::clone(&flag);
    ///     Ok(Disposer::new(move || {
    ///         flag.store(true, Ordering::SeqCst);
    ///         Ok(())
    ///     }))
    /// });
    ///
    /// let mut env = Env::new();
    /// open.map(|_| "read").bracket().run_with(&mut env).unwrap();
    /// assert!(closed.load(Ordering::SeqCst));
    /// assert!(env.resources().is_empty());
    /// ```
    pub fn bracket(self) -> Self {
        let body = self.into_link();
        Self::from_node(Node::Sync(Arc::new(move |env| {
            let mut scope = env.local();
            let outcome = interpreter::drive(body.node(), &mut scope);
            release(scope, outcome)
        })))
    }

    /// Treats this effect as an acquisition and runs `use_` on its result.
    ///
    /// 1. The acquisition runs in a fresh scope.
    /// 2. `use_(acquired)` runs in the same scope.
    /// 3. If `use_` fails with anything but cancellation, `catch(error)` may
    ///    recover or replace the error.
    /// 4. `finally(acquired)` runs exactly once in a detached scope, even if
    ///    the environment was cancelled during `use_`.
    /// 5. The scope is released and the result or error propagates.
    ///
    /// A failing `finally` fails a successful bracket. If the body already
    /// failed, the finalizer's error is logged and the body's error is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    ///
    /// let result = Effect::pure("file.txt")
    ///     .bracket_with(
    ///         |_| Effect::<usize>::fail("unreadable"),
    ///         |_| Effect::pure(0),
    ///         |_| Effect::pure(()),
    ///     )
    ///     .run();
    /// assert_eq!(result, Ok(0));
    /// ```
    pub fn bracket_with<B, U, C, F>(self, use_: U, catch: C, finally: F) -> Effect<B>
    where
        A: Clone,
        B: Send + 'static,
        U: Fn(A) -> Effect<B> + Send + Sync + 'static,
        C: Fn(Error) -> Effect<B> + Send + Sync + 'static,
        F: Fn(A) -> Effect<()> + Send + Sync + 'static,
    {
        let acquire = self.into_link();
        Effect::from_node(Node::Sync(Arc::new(move |env| {
            let mut scope = env.local();
            let acquired = match interpreter::drive(acquire.node(), &mut scope).and_then(unerase::<A>) {
                Ok(acquired) => acquired,
                Err(error) => return release(scope, Err(error)),
            };

            let used = match interpreter::drive(use_(acquired.clone()).into_node(), &mut scope) {
                Err(error) if !error.is_cancelled() => {
                    interpreter::drive(catch(error).into_node(), &mut scope)
                }
                outcome => outcome,
            };

            let finalized = run_detached(finally(acquired).into_node(), &scope);
            let outcome = match (used, finalized) {
                (used, Ok(_)) => used,
                (Ok(_), Err(finalizer_error)) => Err(finalizer_error),
                (Err(error), Err(finalizer_error)) => {
                    tracing::warn!(
                        error = %finalizer_error,
                        cause = %error,
                        "finalizer failed after the bracketed effect failed"
                    );
                    Err(error)
                }
            };
            release(scope, outcome)
        })))
    }

    /// Runs `cleanup` after this effect, whatever the outcome.
    ///
    /// Shorthand for [`Effect::bracket_with`] with nothing to acquire.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let runs = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&runs);
    /// let cleanup = Effect::lift(move || {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    /// });
    ///
    /// let failing = Effect::<i32>::fail("boom").finally(cleanup);
    /// assert_eq!(failing.run(), Err(Error::failure("boom")));
    /// assert_eq!(runs.load(Ordering::SeqCst), 1);
    /// ```
    pub fn finally(self, cleanup: Effect<()>) -> Self {
        Effect::pure(()).bracket_with(
            move |()| self.clone(),
            |error| Effect::fail(error),
            move |()| cleanup.clone(),
        )
    }
}
