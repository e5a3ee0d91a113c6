//! # effector
//!
//! A runtime for cancellable, resource-safe effects.
//!
//! ## Overview
//!
//! - **Effects**: lazy, reusable descriptions of work, interpreted on a
//!   stack-safe trampoline ([`effect`])
//! - **Environments**: hierarchical cancellation, scoped resource
//!   registries and synchronization contexts ([`env`])
//! - **Schedules**: lazy, combinable delay sequences that pace retry and
//!   repeat ([`schedule`])
//! - **Runtime**: the shared async runtime and its configuration
//!   ([`runtime`])
//!
//! ## Example
//!
//! ```rust
//! use effector::prelude::*;
//! use std::time::Duration;
//!
//! let program = Effect::pure(2)
//!     .map(|x| x * 3)
//!     .retry(Schedule::spaced(Duration::from_millis(10)).take(3))
//!     .fork(None)
//!     .flat_map(|handle| handle.join());
//!
//! assert_eq!(program.run(), Ok(6));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use effector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::effect::{Effect, Error, ForkHandle, IntoEffect, Pure, Response};
    pub use crate::env::{Acquired, CancellationSignal, Disposable, Disposer, Env};
    pub use crate::schedule::Schedule;
}

pub mod effect;
pub mod env;
pub mod runtime;
pub mod schedule;

static_assertions::assert_impl_all!(effect::Effect<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(effect::ForkHandle<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(effect::Error: Send, Sync, Clone);
static_assertions::assert_impl_all!(env::Env: Send);
static_assertions::assert_impl_all!(schedule::Schedule: Send, Sync, Clone);
