//! The effect type and its core combinators.
//!
//! An [`Effect<A>`] is an immutable description of work that, given an
//! [`Env`], produces an `A` or fails with an [`Error`]. Nothing runs until the
//! effect is handed to the interpreter through [`Effect::run`] or
//! [`Effect::run_with`], and running never consumes or mutates the
//! description: the same effect can be run again, which is what retry and
//! repeat rely on.
//!
//! # Representation
//!
//! Internally an effect is an untyped `Node` tree. Values travel between
//! nodes boxed as `dyn Any`, which lets continuations with different
//! intermediate types share one interpreter stack, in the same spirit as a
//! freer monad's type-erased arrows. The typed API on `Effect<A>` guarantees
//! every downcast succeeds; a mismatch is reported as [`Error::Bottom`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use super::lift::IntoEffect;
use super::{Error, Response, interpreter, scope};
use crate::env::{Acquired, CancellationSignal, Disposable, Env, ResourceId};

// =============================================================================
// Untyped Representation
// =============================================================================

pub(crate) type Value = Box<dyn Any + Send>;
pub(crate) type Thunk = Arc<dyn Fn(&mut Env) -> Result<Value, Error> + Send + Sync>;
pub(crate) type AsyncThunk =
    Arc<dyn Fn(&mut Env) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;
pub(crate) type StepThunk = Arc<dyn Fn(&mut Env) -> Result<Transition, Error> + Send + Sync>;
pub(crate) type Continuation = Arc<dyn Fn(Value) -> Result<Transition, Error> + Send + Sync>;
pub(crate) type Handler = Arc<dyn Fn(Error) -> Result<Transition, Error> + Send + Sync>;

/// Untyped counterpart of [`Response`].
pub(crate) enum Transition {
    Complete(Value),
    Recurse(Node),
}

#[derive(Clone)]
pub(crate) enum Node {
    /// Produces a fresh copy of a stored value.
    Pure(Arc<dyn Fn() -> Value + Send + Sync>),
    Fail(Error),
    Sync(Thunk),
    Async(AsyncThunk),
    Step(StepThunk),
    Bind(Link, Continuation),
    Catch(Link, Handler),
}

impl Node {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Pure(_) => "Pure",
            Self::Fail(_) => "Fail",
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
            Self::Step(_) => "Step",
            Self::Bind(..) => "Bind",
            Self::Catch(..) => "Catch",
        }
    }
}

/// Shared pointer to a `Node`.
///
/// Every effect and every `Bind`/`Catch` source sits behind a `Link`, and
/// continuations routinely capture further effects, so a long chain is a
/// deep graph of links. Dropping a link never recurses: a link dropped while
/// another is being reclaimed on the same thread queues its node, and the
/// outermost drop releases the queue in a loop.
pub(crate) struct Link(Option<Arc<Node>>);

thread_local! {
    /// `Some` while a `Link` drop is reclaiming nodes on this thread.
    static RECLAIM: RefCell<Option<Vec<Arc<Node>>>> = const { RefCell::new(None) };
}

impl Link {
    fn new(node: Node) -> Self {
        Self(Some(Arc::new(node)))
    }

    pub(crate) fn node(&self) -> Node {
        self.0.as_deref().map_or_else(
            || Node::Fail(Error::Bottom("effect link was already consumed")),
            Node::clone,
        )
    }

    pub(crate) fn into_node(mut self) -> Node {
        self.0.take().map_or(
            Node::Fail(Error::Bottom("effect link was already consumed")),
            Arc::unwrap_or_clone,
        )
    }

    fn kind(&self) -> &'static str {
        self.0.as_deref().map_or("Consumed", Node::kind)
    }
}

impl Clone for Link {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        let Some(node) = self.0.take() else {
            return;
        };
        let mut node = Some(node);
        let outermost = RECLAIM.try_with(|queue| {
            let mut queue = queue.borrow_mut();
            match queue.as_mut() {
                Some(pending) => {
                    pending.extend(node.take());
                    false
                }
                None => {
                    *queue = Some(Vec::new());
                    true
                }
            }
        });
        if matches!(outermost, Ok(true)) {
            reclaim(node.take());
        }
    }
}

/// Drops `first` and then every node queued while dropping it.
fn reclaim(first: Option<Arc<Node>>) {
    let mut next = first;
    while let Some(node) = next {
        drop(node);
        next = RECLAIM
            .try_with(|queue| queue.borrow_mut().as_mut().and_then(Vec::pop))
            .ok()
            .flatten();
    }
    let _ = RECLAIM.try_with(|queue| queue.borrow_mut().take());
}

pub(crate) fn erase<A: Send + 'static>(value: A) -> Value {
    Box::new(value)
}

pub(crate) fn unerase<A: 'static>(value: Value) -> Result<A, Error> {
    value
        .downcast::<A>()
        .map(|boxed| *boxed)
        .map_err(|_| Error::Bottom("effect produced a value of an unexpected type"))
}

// =============================================================================
// Effect
// =============================================================================

/// A description of deferred, possibly failing, possibly suspending work.
///
/// # Monad Laws
///
/// `Effect` satisfies the monad laws up to observable results:
///
/// 1. **Left Identity**: `Effect::pure(a).flat_map(f) == f(a)`
/// 2. **Right Identity**: `m.flat_map(Effect::pure) == m`
/// 3. **Associativity**: `m.flat_map(f).flat_map(g) == m.flat_map(|x| f(x).flat_map(g))`
///
/// # Examples
///
/// ```rust
/// use effector::effect::Effect;
///
/// let effect = Effect::pure(2).map(|x| x * 3);
/// assert_eq!(effect.run(), Ok(6));
/// // Running does not consume the description.
/// assert_eq!(effect.run(), Ok(6));
/// ```
pub struct Effect<A> {
    link: Link,
    _result: PhantomData<fn() -> A>,
}

impl<A> Effect<A> {
    pub(crate) fn from_node(node: Node) -> Self {
        Self::from_link(Link::new(node))
    }

    const fn from_link(link: Link) -> Self {
        Self {
            link,
            _result: PhantomData,
        }
    }

    pub(crate) fn node(&self) -> Node {
        self.link.node()
    }

    pub(crate) fn into_node(self) -> Node {
        self.link.into_node()
    }

    pub(crate) fn into_link(self) -> Link {
        self.link
    }
}

impl<A> Clone for Effect<A> {
    fn clone(&self) -> Self {
        Self::from_link(self.link.clone())
    }
}

impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Effect")
            .field("node", &self.link.kind())
            .finish()
    }
}

// =============================================================================
// Construction
// =============================================================================

impl<A: Send + 'static> Effect<A> {
    /// Wraps an already computed value. Never suspends.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// assert_eq!(Effect::pure(42).run(), Ok(42));
    /// ```
    pub fn pure(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self::from_node(Node::Pure(Arc::new(move || erase(value.clone()))))
    }

    /// An effect that always fails with `error`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    ///
    /// let effect: Effect<i32> = Effect::fail("boom");
    /// assert_eq!(effect.run(), Err(Error::failure("boom")));
    /// ```
    pub fn fail(error: impl Into<Error>) -> Self {
        Self::from_node(Node::Fail(error.into()))
    }

    /// Runs `thunk` synchronously each time the effect is evaluated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let observed = Arc::clone(&counter);
    /// let effect = Effect::lift(move || observed.fetch_add(1, Ordering::SeqCst) + 1);
    ///
    /// // Nothing has happened yet.
    /// assert_eq!(counter.load(Ordering::SeqCst), 0);
    /// assert_eq!(effect.run(), Ok(1));
    /// assert_eq!(effect.run(), Ok(2));
    /// ```
    pub fn lift<F>(thunk: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::from_node(Node::Sync(Arc::new(move |_| Ok(erase(thunk())))))
    }

    /// Runs a fallible `thunk` synchronously.
    pub fn try_lift<F, E>(thunk: F) -> Self
    where
        F: Fn() -> Result<A, E> + Send + Sync + 'static,
        E: Into<Error>,
    {
        Self::from_node(Node::Sync(Arc::new(move |_| {
            thunk().map(erase).map_err(Into::into)
        })))
    }

    /// Runs `thunk` with access to the evaluating environment.
    ///
    /// This is how effects acquire resources or inspect cancellation.
    pub fn with_env<F>(thunk: F) -> Self
    where
        F: Fn(&mut Env) -> Result<A, Error> + Send + Sync + 'static,
    {
        Self::from_node(Node::Sync(Arc::new(move |env| thunk(env).map(erase))))
    }

    /// Runs the future built by `thunk`, suspending the evaluating thread
    /// until it resolves.
    ///
    /// The future is driven on the shared runtime and raced against the
    /// environment's cancellation signal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    /// use std::time::Duration;
    ///
    /// let effect = Effect::lift_async(|| async {
    ///     tokio::time::sleep(Duration::from_millis(1)).await;
    ///     Ok::<_, Error>(7)
    /// });
    /// assert_eq!(effect.run(), Ok(7));
    /// ```
    pub fn lift_async<F, Fut, E>(thunk: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
        E: Into<Error>,
    {
        Self::from_node(Node::Async(Arc::new(move |_| {
            thunk()
                .map(|outcome| outcome.map(erase).map_err(Into::into))
                .boxed()
        })))
    }

    /// Suspends until `register` hands the result to its [`Resume`].
    ///
    /// If the `Resume` is dropped without being used the step yields
    /// neither a value nor an error, which raises [`Error::Bottom`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// let effect = Effect::from_callback(|resume| {
    ///     std::thread::spawn(move || resume.succeed(5));
    /// });
    /// assert_eq!(effect.run(), Ok(5));
    ///
    /// let silent: Effect<i32> = Effect::from_callback(drop);
    /// assert!(silent.run().unwrap_err().is_bottom());
    /// ```
    pub fn from_callback<F>(register: F) -> Self
    where
        F: Fn(Resume<A>) + Send + Sync + 'static,
    {
        Self::from_node(Node::Async(Arc::new(move |_| {
            let (sender, receiver) = oneshot::channel();
            register(Resume { sender });
            async move {
                match receiver.await {
                    Ok(outcome) => outcome.map(erase),
                    Err(_) => Err(Error::Bottom(
                        "async step completed without a value or an error",
                    )),
                }
            }
            .boxed()
        })))
    }

    /// Builds an effect from a single evaluation step.
    ///
    /// Returning [`Response::Recurse`] continues with another effect without
    /// growing the native stack.
    pub fn step<F>(step: F) -> Self
    where
        F: Fn(&mut Env) -> Result<Response<A>, Error> + Send + Sync + 'static,
    {
        Self::from_node(Node::Step(Arc::new(move |env| {
            step(env).map(|response| match response {
                Response::Complete(value) => Transition::Complete(erase(value)),
                Response::Recurse(next) => Transition::Recurse(next.into_node()),
            })
        })))
    }
}

/// Completes an effect built with [`Effect::from_callback`].
pub struct Resume<A> {
    sender: oneshot::Sender<Result<A, Error>>,
}

impl<A> Resume<A> {
    /// Completes the step with `outcome`.
    ///
    /// Does nothing if the waiting effect was already cancelled.
    pub fn complete(self, outcome: Result<A, Error>) {
        let _ = self.sender.send(outcome);
    }

    /// Completes the step with a value.
    pub fn succeed(self, value: A) {
        self.complete(Ok(value));
    }

    /// Completes the step with an error.
    pub fn fail(self, error: impl Into<Error>) {
        self.complete(Err(error.into()));
    }
}

impl<A> fmt::Debug for Resume<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Resume").finish_non_exhaustive()
    }
}

// =============================================================================
// Running
// =============================================================================

impl<A: Send + 'static> Effect<A> {
    /// Runs the effect against a fresh root environment.
    ///
    /// Resources still owned by the root scope are released before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns the unrecovered error, [`Error::Cancelled`], or the first
    /// error raised while releasing the root scope.
    pub fn run(&self) -> Result<A, Error> {
        let mut env = Env::new();
        let outcome = self.run_with(&mut env);
        scope::release(env, outcome)
    }

    /// Runs the effect against `env`.
    ///
    /// Resources acquired by the effect stay owned by `env`.
    ///
    /// # Errors
    ///
    /// Returns the unrecovered error or [`Error::Cancelled`].
    pub fn run_with(&self, env: &mut Env) -> Result<A, Error> {
        interpreter::drive(self.node(), env).and_then(unerase)
    }
}

// =============================================================================
// Functor / Monad
// =============================================================================

impl<A: Send + 'static> Effect<A> {
    /// Transforms the result with `function`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// assert_eq!(Effect::pure(21).map(|x| x * 2).run(), Ok(42));
    /// ```
    pub fn map<B, F>(self, function: F) -> Effect<B>
    where
        F: Fn(A) -> B + Send + Sync + 'static,
        B: Send + 'static,
    {
        let continuation: Continuation = Arc::new(move |value| {
            let value = unerase::<A>(value)?;
            Ok(Transition::Complete(erase(function(value))))
        });
        Effect::from_node(Node::Bind(self.link, continuation))
    }

    /// Chains an effect computed from the result.
    ///
    /// Chains of any length and nesting run at constant native stack depth.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// let mut effect = Effect::pure(0_u64);
    /// for _ in 0..100_000 {
    ///     effect = effect.flat_map(|x| Effect::pure(x + 1));
    /// }
    /// assert_eq!(effect.run(), Ok(100_000));
    /// ```
    pub fn flat_map<B, F>(self, function: F) -> Effect<B>
    where
        F: Fn(A) -> Effect<B> + Send + Sync + 'static,
        B: Send + 'static,
    {
        let continuation: Continuation = Arc::new(move |value| {
            let value = unerase::<A>(value)?;
            Ok(Transition::Recurse(function(value).into_node()))
        });
        Effect::from_node(Node::Bind(self.link, continuation))
    }

    /// Alias for [`Effect::flat_map`].
    #[inline]
    pub fn bind<B, F>(self, function: F) -> Effect<B>
    where
        F: Fn(A) -> Effect<B> + Send + Sync + 'static,
        B: Send + 'static,
    {
        self.flat_map(function)
    }

    /// Chains anything that converts into an effect, such as a `Result`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::{Effect, Error};
    ///
    /// let parsed = Effect::pure("42".to_string())
    ///     .and_then(|text| text.parse::<i32>().map_err(|e| Error::from_error(e)));
    /// assert_eq!(parsed.run(), Ok(42));
    /// ```
    pub fn and_then<B, R, F>(self, function: F) -> Effect<B>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        R: IntoEffect<B>,
        B: Send + 'static,
    {
        self.flat_map(move |value| function(value).into_effect())
    }

    /// Runs `next` after this effect, discarding this effect's result.
    pub fn then<B>(self, next: Effect<B>) -> Effect<B>
    where
        B: Send + 'static,
    {
        self.flat_map(move |_| next.clone())
    }

    /// Discards the result.
    pub fn void(self) -> Effect<()> {
        self.map(|_| ())
    }

    /// Combines this effect's result with `other`'s, running them in order.
    pub fn map2<B, C, F>(self, other: Effect<B>, function: F) -> Effect<C>
    where
        A: Clone + Sync,
        B: Send + 'static,
        C: Send + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        self.flat_map(move |first| {
            let function = Arc::clone(&function);
            other
                .clone()
                .map(move |second| function(first.clone(), second))
        })
    }

    /// Pairs this effect's result with `other`'s.
    pub fn product<B>(self, other: Effect<B>) -> Effect<(A, B)>
    where
        A: Clone + Sync,
        B: Send + 'static,
    {
        self.map2(other, |first, second| (first, second))
    }
}

// =============================================================================
// Error Handling
// =============================================================================

impl<A: Send + 'static> Effect<A> {
    /// Recovers from a failure with the effect returned by `handler`.
    ///
    /// Cancellation bypasses the handler.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    ///
    /// let recovered = Effect::<i32>::fail("boom").catch(|_| Effect::pure(0));
    /// assert_eq!(recovered.run(), Ok(0));
    /// ```
    pub fn catch<F>(self, handler: F) -> Self
    where
        F: Fn(Error) -> Self + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |error| Ok(Transition::Recurse(handler(error).into_node())));
        Self::from_node(Node::Catch(self.link, handler))
    }

    /// Surfaces a failure as an `Err` value instead of raising it.
    ///
    /// Cancellation is still raised.
    pub fn attempt(self) -> Effect<Result<A, Error>> {
        let handler: Handler =
            Arc::new(|error| Ok(Transition::Complete(erase(Err::<A, Error>(error)))));
        let succeeded = self.map(Ok::<A, Error>);
        Effect::from_node(Node::Catch(succeeded.link, handler))
    }

    /// Rewrites a failure. Cancellation passes through unchanged.
    pub fn map_err<F>(self, function: F) -> Self
    where
        F: Fn(Error) -> Error + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |error| Err(function(error)));
        Self::from_node(Node::Catch(self.link, handler))
    }

    /// Runs this effect after waiting for `delay`.
    pub fn delay(self, delay: Duration) -> Self {
        Effect::sleep(delay).then(self)
    }
}

// =============================================================================
// Environment Effects
// =============================================================================

impl Effect<()> {
    /// Waits for `duration`, raising [`Error::Cancelled`] early if the
    /// environment is cancelled.
    pub fn sleep(duration: Duration) -> Self {
        Self::with_env(move |env| {
            if !duration.is_zero() && env.signal().wait_timeout(duration) {
                return Err(Error::Cancelled);
            }
            env.check_cancelled()
        })
    }

    /// Cancels the evaluating environment. Every later step raises
    /// [`Error::Cancelled`].
    pub fn cancel() -> Self {
        Self::with_env(|env| {
            env.cancel();
            Ok(())
        })
    }

    /// Releases a resource owned by the evaluating environment.
    ///
    /// Releasing an id the environment does not own does nothing.
    pub fn release(id: ResourceId) -> Self {
        Self::with_env(move |env| env.resources_mut().release(id).map(|_| ()))
    }
}

impl Effect<bool> {
    /// Reports whether the evaluating environment, or the one it was derived
    /// from, is cancelled.
    ///
    /// A cancelled environment raises before any step runs, so this is
    /// mostly useful inside finalizers, which run detached from the scope
    /// they clean up.
    pub fn is_cancelled() -> Self {
        Self::with_env(|env| {
            Ok(env.is_cancelled()
                || env
                    .parent_signal()
                    .is_some_and(CancellationSignal::is_cancelled))
        })
    }
}

impl<R: Disposable + 'static> Effect<Acquired<R>> {
    /// Creates a resource with `make` and registers it with the evaluating
    /// environment, which then owns its release.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use effector::effect::Effect;
    /// use effector::env::{Disposer, Env};
    ///
    /// let mut env = Env::new();
    /// let acquire = Effect::acquire(|| Ok(Disposer::new(|| Ok(()))));
    /// let handle = acquire.run_with(&mut env).unwrap();
    /// assert!(env.resources().owns(handle.id()));
    /// ```
    pub fn acquire<F>(make: F) -> Self
    where
        F: Fn() -> Result<R, Error> + Send + Sync + 'static,
    {
        Self::with_env(move |env| Ok(env.resources_mut().acquire(make()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_pure_and_run() {
        assert_eq!(Effect::pure(42).run(), Ok(42));
    }

    #[rstest]
    fn test_map() {
        assert_eq!(Effect::pure(21).map(|x| x * 2).run(), Ok(42));
    }

    #[rstest]
    fn test_flat_map() {
        assert_eq!(Effect::pure(10).flat_map(|x| Effect::pure(x * 2)).run(), Ok(20));
    }

    #[rstest]
    fn test_then_and_void() {
        assert_eq!(Effect::pure(1).then(Effect::pure("next")).run(), Ok("next"));
        assert_eq!(Effect::pure(1).void().run(), Ok(()));
    }

    #[rstest]
    fn test_map2_and_product() {
        assert_eq!(
            Effect::pure(10).map2(Effect::pure(20), |a, b| a + b).run(),
            Ok(30)
        );
        assert_eq!(
            Effect::pure(1).product(Effect::pure("one")).run(),
            Ok((1, "one"))
        );
    }

    #[rstest]
    fn test_try_lift_converts_error() {
        let effect: Effect<i32> = Effect::try_lift(|| Err("bad input"));
        assert_eq!(effect.run(), Err(Error::failure("bad input")));
    }

    #[rstest]
    fn test_catch_recovers() {
        let effect = Effect::<i32>::fail("boom").catch(|error| {
            assert_eq!(error, Error::failure("boom"));
            Effect::pure(1)
        });
        assert_eq!(effect.run(), Ok(1));
    }

    #[rstest]
    fn test_attempt_surfaces_errors() {
        assert_eq!(Effect::pure(3).attempt().run(), Ok(Ok(3)));
        assert_eq!(
            Effect::<i32>::fail("x").attempt().run(),
            Ok(Err(Error::failure("x")))
        );
    }

    #[rstest]
    fn test_map_err_rewrites_failure() {
        let effect = Effect::<i32>::fail("inner").map_err(|error| {
            Error::failure(format!("outer: {error}"))
        });
        assert_eq!(effect.run(), Err(Error::failure("outer: inner")));
    }

    #[rstest]
    fn test_cancel_stops_following_steps() {
        let effect = Effect::cancel().then(Effect::lift(|| 1));
        assert_eq!(effect.run(), Err(Error::Cancelled));
    }

    #[rstest]
    fn test_catch_does_not_see_cancellation() {
        let effect = Effect::cancel()
            .then(Effect::pure(1))
            .catch(|_| Effect::pure(2));
        assert_eq!(effect.run(), Err(Error::Cancelled));
    }

    #[rstest]
    fn test_is_cancelled_in_finalizer_sees_cancelled_scope() {
        use std::sync::atomic::{AtomicBool, Ordering};

        assert_eq!(Effect::is_cancelled().run(), Ok(false));

        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let effect = Effect::pure(()).bracket_with(
            |()| Effect::cancel().then(Effect::pure(())),
            |error| Effect::fail(error),
            move |()| {
                let flag = Arc::clone(&flag);
                Effect::is_cancelled().map(move |cancelled| flag.store(cancelled, Ordering::SeqCst))
            },
        );
        assert_eq!(effect.run(), Err(Error::Cancelled));
        assert!(observed.load(Ordering::SeqCst));
    }

    #[rstest]
    fn test_sleep_is_cancellable() {
        let mut env = Env::new();
        env.cancel_after(Duration::from_millis(10));
        let started = std::time::Instant::now();
        assert_eq!(
            Effect::sleep(Duration::from_secs(30)).run_with(&mut env),
            Err(Error::Cancelled)
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[rstest]
    fn test_debug_shows_node_kind() {
        assert_eq!(format!("{:?}", Effect::pure(1)), "Effect { node: \"Pure\" }");
        assert_eq!(
            format!("{:?}", Effect::pure(1).map(|x| x + 1)),
            "Effect { node: \"Bind\" }"
        );
    }

    #[rstest]
    fn test_deep_left_nested_chain_drops_without_overflow() {
        let mut effect = Effect::pure(0_u64);
        for _ in 0..200_000 {
            effect = effect.map(|x| x + 1);
        }
        drop(effect);
    }
}
