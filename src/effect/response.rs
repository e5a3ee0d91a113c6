//! The result of a single evaluation step.

use std::fmt;

use super::Effect;

/// What one evaluation step produced.
///
/// A step either finishes with a value or hands back another effect to
/// continue with. The interpreter loops over `Recurse` instead of calling
/// itself, which keeps user-level recursion at constant stack depth.
///
/// # Examples
///
/// ```rust
/// use effector::effect::{Effect, Response};
///
/// fn count_down(n: u64) -> Effect<u64> {
///     Effect::step(move |_| {
///         Ok(if n == 0 {
///             Response::Complete(0)
///         } else {
///             Response::Recurse(count_down(n - 1))
///         })
///     })
/// }
///
/// assert_eq!(count_down(100_000).run(), Ok(0));
/// ```
pub enum Response<A> {
    /// The step produced the final value.
    Complete(A),
    /// The step must continue with another effect.
    Recurse(Effect<A>),
}

impl<A> Response<A> {
    /// Returns `true` for [`Response::Complete`].
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

impl<A: fmt::Debug> fmt::Debug for Response<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(value) => formatter.debug_tuple("Complete").field(value).finish(),
            Self::Recurse(_) => formatter.debug_tuple("Recurse").field(&"<effect>").finish(),
        }
    }
}
