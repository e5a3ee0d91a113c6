//! The execution environment threaded through every evaluation step.
//!
//! An [`Env`] bundles:
//!
//! - a [`CancellationSignal`] checked at every step,
//! - a [`ResourceRegistry`] owning what the current scope acquired,
//! - an optional [`SyncContext`] that [`Effect::post`](crate::effect::Effect::post)
//!   marshals work onto.
//!
//! A root `Env` is created per top-level run. Scoped operations derive
//! children from it:
//!
//! | Derivation | Signal | Registry |
//! |------------|--------|----------|
//! | [`Env::local`] | child of parent | empty |
//! | [`Env::fork`] | child of parent | empty, seeded with a view of the parent's |
//! | [`Env::detached`] | fresh, unlinked | empty |
//!
//! A child scope ends with [`Env::merge_into`] (success: the parent takes
//! ownership of everything acquired) or [`Env::release`] (failure: everything
//! acquired is disposed).

mod cancellation;
mod context;
mod resources;

pub use cancellation::{CancellationSignal, Deadline, Registration};
pub use context::{DedicatedContext, Job, SyncContext};
pub use resources::{Acquired, Disposable, Disposer, ResourceId, ResourceRegistry};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::effect::Error;

/// The environment an effect is evaluated against.
///
/// # Examples
///
/// ```rust
/// use effector::env::{Disposer, Env};
///
/// let mut parent = Env::new();
/// let mut child = parent.local();
/// child.resources_mut().acquire(Disposer::new(|| Ok(())));
///
/// child.merge_into(&mut parent);
/// assert_eq!(parent.resources().len(), 1);
/// ```
pub struct Env {
    signal: CancellationSignal,
    resources: ResourceRegistry,
    context: Option<Arc<dyn SyncContext>>,
    parent: Option<CancellationSignal>,
}

impl Env {
    /// Creates a root environment with a fresh signal and an empty registry.
    pub fn new() -> Self {
        Self::with_signal(CancellationSignal::new())
    }

    /// Creates a root environment observing an existing signal.
    ///
    /// Cancelling `signal` from outside cancels every effect run against
    /// this environment.
    pub fn with_signal(signal: CancellationSignal) -> Self {
        Self {
            signal,
            resources: ResourceRegistry::new(),
            context: None,
            parent: None,
        }
    }

    /// Captures `context` as the target of [`Effect::post`](crate::effect::Effect::post).
    #[must_use]
    pub fn with_context(mut self, context: Arc<dyn SyncContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns the cancellation signal.
    pub const fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Returns the signal of the environment this one was derived from.
    pub const fn parent_signal(&self) -> Option<&CancellationSignal> {
        self.parent.as_ref()
    }

    /// Returns the resource registry.
    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Returns the resource registry mutably.
    pub const fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// Returns the captured synchronization context, if any.
    pub const fn context(&self) -> Option<&Arc<dyn SyncContext>> {
        self.context.as_ref()
    }

    /// Raises this environment's signal.
    pub fn cancel(&self) -> bool {
        self.signal.cancel()
    }

    /// Raises this environment's signal after `delay`.
    pub fn cancel_after(&self, delay: Duration) -> Deadline {
        self.signal.cancel_after(delay)
    }

    /// Returns `true` once this environment is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Returns `Err(Error::Cancelled)` once this environment is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the signal is raised.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        self.signal.check()
    }

    /// Derives a child scope with a linked signal and an empty registry.
    #[must_use]
    pub fn local(&self) -> Self {
        Self {
            signal: self.signal.child(),
            resources: ResourceRegistry::new(),
            context: self.context.clone(),
            parent: Some(self.signal.clone()),
        }
    }

    /// Derives the environment of a fork: a linked signal and a registry
    /// that sees this environment's resources without owning them.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            signal: self.signal.child(),
            resources: ResourceRegistry::seeded_from(&self.resources),
            context: self.context.clone(),
            parent: Some(self.signal.clone()),
        }
    }

    /// Derives a scope that ignores this environment's cancellation.
    ///
    /// Used to run finalizers to completion after a cancellation.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            signal: CancellationSignal::new(),
            resources: ResourceRegistry::new(),
            context: self.context.clone(),
            parent: Some(self.signal.clone()),
        }
    }

    /// Ends this scope successfully, handing its resources to `parent`.
    pub fn merge_into(self, parent: &mut Self) {
        self.resources.merge_into(&mut parent.resources);
    }

    /// Ends this scope by releasing everything it acquired.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while releasing.
    pub fn release(mut self) -> Result<(), Error> {
        self.resources.release_all()
    }

    /// Ends this scope and returns its registry.
    pub fn into_resources(self) -> ResourceRegistry {
        self.resources
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Env")
            .field("signal", &self.signal)
            .field("resources", &self.resources)
            .field("context", &self.context.as_ref().map(|context| context.name()))
            .finish_non_exhaustive()
    }
}
