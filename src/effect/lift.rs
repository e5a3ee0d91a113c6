//! Conversions into [`Effect`].
//!
//! [`IntoEffect`] lets [`Effect::and_then`] accept anything that naturally
//! describes a next step: another effect, a plain `Result`, or a value
//! wrapped in [`Pure`].

use super::{Effect, Error};

/// Types that can be turned into an [`Effect`].
pub trait IntoEffect<A> {
    /// Converts `self` into an effect.
    fn into_effect(self) -> Effect<A>;
}

// Effect<A> implementation - identity
impl<A> IntoEffect<A> for Effect<A> {
    fn into_effect(self) -> Self {
        self
    }
}

impl<A, E> IntoEffect<A> for Result<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Into<Error>,
{
    fn into_effect(self) -> Effect<A> {
        match self {
            Ok(value) => Effect::pure(value),
            Err(error) => Effect::fail(error),
        }
    }
}

/// Marks a plain value as an already computed step.
///
/// # Examples
///
/// ```rust
/// use effector::effect::{Effect, Pure};
///
/// let doubled = Effect::pure(21).and_then(|x| Pure(x * 2));
/// assert_eq!(doubled.run(), Ok(42));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pure<A>(pub A);

impl<A> IntoEffect<A> for Pure<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn into_effect(self) -> Effect<A> {
        Effect::pure(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_result_ok_becomes_pure() {
        let effect: Effect<i32> = Ok::<_, Error>(3).into_effect();
        assert_eq!(effect.run(), Ok(3));
    }

    #[rstest]
    fn test_result_err_becomes_failure() {
        let effect: Effect<i32> = Err::<i32, _>("nope").into_effect();
        assert_eq!(effect.run(), Err(Error::failure("nope")));
    }

    #[rstest]
    fn test_and_then_accepts_effect() {
        let effect = Effect::pure(2).and_then(|x| Effect::pure(x + 1));
        assert_eq!(effect.run(), Ok(3));
    }
}
