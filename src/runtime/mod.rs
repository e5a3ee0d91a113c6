//! Shared runtime plumbing.
//!
//! This module owns the process-wide tokio runtime that hosts async steps
//! and cancellation timers, plus the blocking bridge the synchronous
//! interpreter uses to drive futures.
//!
//! # Blocking Execution
//!
//! The interpreter is synchronous: an async step blocks the evaluating
//! thread until its future resolves. [`try_block_on`] picks the right way to
//! do that:
//!
//! - **Outside a runtime** (the usual case: the main thread, a fork thread,
//!   a context thread): the global runtime's `block_on`.
//! - **Inside a multi-thread runtime**: `block_in_place` with the current
//!   handle, so the worker is handed off instead of stalling the pool.
//! - **Inside a current-thread runtime**: refused with
//!   [`BlockingError::CurrentThreadRuntime`], because blocking there would
//!   deadlock the only worker.

mod completion;
mod config;

pub use completion::{Completer, Completion};
pub use config::{ConfigError, MIN_STACK_SIZE, RuntimeConfig, config, configure};

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::effect;
use crate::env::CancellationSignal;

// =============================================================================
// Global Runtime
// =============================================================================

/// Global tokio runtime initialized lazily on first access.
///
/// Sized by [`config()`]; it has static lifetime and is never dropped.
static GLOBAL_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    let settings = config();
    tracing::debug!(
        worker_threads = settings.worker_threads(),
        "starting shared effect runtime"
    );
    Builder::new_multi_thread()
        .worker_threads(settings.worker_threads())
        .thread_name("effector-async")
        .enable_all()
        .build()
        .expect("Failed to create global tokio runtime")
});

/// Returns a reference to the global runtime.
#[inline]
#[must_use]
pub fn global() -> &'static Runtime {
    &GLOBAL_RUNTIME
}

// =============================================================================
// Blocking Error
// =============================================================================

/// Error type for blocking execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingError {
    /// Cannot block inside a current-thread runtime.
    CurrentThreadRuntime,

    /// The runtime flavor is not supported for blocking execution.
    ///
    /// Kept for tokio flavors added after this crate was written.
    UnsupportedRuntimeFlavor,
}

impl fmt::Display for BlockingError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentThreadRuntime => {
                write!(
                    formatter,
                    "cannot execute blocking operation in current-thread runtime: \
                     block_in_place is only supported in multi-thread runtimes"
                )
            }
            Self::UnsupportedRuntimeFlavor => {
                write!(
                    formatter,
                    "cannot execute blocking operation: \
                     the runtime flavor is not supported for blocking execution"
                )
            }
        }
    }
}

impl Error for BlockingError {}

// =============================================================================
// Blocking Execution
// =============================================================================

/// Executes a future synchronously, blocking the current thread.
///
/// # Errors
///
/// Returns [`BlockingError::CurrentThreadRuntime`] when called from within a
/// current-thread tokio runtime.
///
/// # Examples
///
/// ```rust
/// use effector::runtime::try_block_on;
///
/// let result = try_block_on(async {
///     tokio::time::sleep(std::time::Duration::from_millis(1)).await;
///     42
/// });
/// assert_eq!(result, Ok(42));
/// ```
pub fn try_block_on<F, T>(future: F) -> Result<T, BlockingError>
where
    F: Future<Output = T>,
{
    if let Ok(current_handle) = Handle::try_current() {
        match current_handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => Ok(tokio::task::block_in_place(|| {
                current_handle.block_on(future)
            })),
            RuntimeFlavor::CurrentThread => Err(BlockingError::CurrentThreadRuntime),
            _ => Err(BlockingError::UnsupportedRuntimeFlavor),
        }
    } else {
        Ok(global().block_on(future))
    }
}

/// Drives an async step to completion unless `signal` fires first.
///
/// Panics inside the future are caught and reported as
/// [`effect::Error::Panicked`].
pub(crate) fn block_on_cancellable<T>(
    future: BoxFuture<'static, Result<T, effect::Error>>,
    signal: &CancellationSignal,
) -> Result<T, effect::Error>
where
    T: Send + 'static,
{
    let cancelled = signal.cancelled();
    try_block_on(async move {
        tokio::select! {
            biased;
            () = cancelled => Err(effect::Error::Cancelled),
            outcome = AssertUnwindSafe(future).catch_unwind() => {
                outcome.unwrap_or_else(|panic| Err(effect::Error::from_panic(panic)))
            }
        }
    })?
}
