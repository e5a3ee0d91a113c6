//! Cancellable, resource-safe effects.
//!
//! An [`Effect<A>`] describes work that yields an `A` or fails with an
//! [`Error`]. Effects are plain values: building one performs nothing, and
//! running one never consumes it.
//!
//! ```rust
//! use effector::effect::Effect;
//!
//! let effect = Effect::pure(10)
//!     .map(|x| x * 2)
//!     .flat_map(|x| Effect::pure(x + 1));
//!
//! assert_eq!(effect.run(), Ok(21));
//! ```
//!
//! # Interpretation
//!
//! Effects run on a trampolined interpreter with an explicit continuation
//! stack, so arbitrarily long `map`/`flat_map` chains and
//! [`Response::Recurse`] loops never grow the native stack. Every step
//! checks the environment's cancellation signal first.
//!
//! # Combinators
//!
//! | Concern | Operations |
//! |---------|------------|
//! | Construction | [`Effect::pure`], [`Effect::fail`], [`Effect::lift`], [`Effect::try_lift`], [`Effect::lift_async`], [`Effect::from_callback`], [`Effect::step`], [`Effect::with_env`] |
//! | Composition | [`Effect::map`], [`Effect::flat_map`], [`Effect::and_then`], [`Effect::then`], [`Effect::map2`], [`Effect::product`] |
//! | Errors | [`Effect::catch`], [`Effect::attempt`], [`Effect::map_err`] |
//! | Scopes | [`Effect::local`], [`Effect::bracket`], [`Effect::bracket_with`], [`Effect::finally`] |
//! | Pacing | [`Effect::retry_until`], [`Effect::repeat_until`], [`Effect::sleep`], [`Effect::delay`] |
//! | Concurrency | [`Effect::fork`], [`ForkHandle::join`], [`ForkHandle::cancel`], [`Effect::post`] |

mod computation;
mod error;
mod fork;
mod interpreter;
mod lift;
mod post;
mod response;
mod retry;
mod scope;

pub use computation::{Effect, Resume};
pub use error::{EffectResult, Error, Failure};
pub use fork::{ForkCancelled, ForkHandle, ForkId};
pub use lift::{IntoEffect, Pure};
pub use response::Response;
