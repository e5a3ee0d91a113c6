//! Property-based tests for Effect laws.
//!
//! This module verifies that the Effect type satisfies the Functor and
//! Monad laws, observed through `run`:
//! - Functor Identity: m.map(id) == m
//! - Functor Composition: m.map(f).map(g) == m.map(|x| g(f(x)))
//! - Left Identity: pure(a).flat_map(f) == f(a)
//! - Right Identity: m.flat_map(pure) == m
//! - Associativity: m.flat_map(f).flat_map(g) == m.flat_map(|x| f(x).flat_map(g))

use effector::effect::{Effect, Error};
use proptest::prelude::*;

fn failing_or_pure(value: i32) -> Effect<i32> {
    if value % 3 == 0 {
        Effect::fail(format!("divisible: {value}"))
    } else {
        Effect::pure(value)
    }
}

// =============================================================================
// Functor Laws
// =============================================================================

proptest! {
    /// Functor Identity Law: m.map(id) == m
    #[test]
    fn prop_effect_functor_identity(value: i32) {
        let effect = failing_or_pure(value);
        prop_assert_eq!(effect.clone().map(|x| x).run(), effect.run());
    }

    /// Functor Composition Law: m.map(f).map(g) == m.map(|x| g(f(x)))
    #[test]
    fn prop_effect_functor_composition(value: i32) {
        let function1 = |n: i32| n.wrapping_add(1);
        let function2 = |n: i32| n.wrapping_mul(2);

        let left = failing_or_pure(value).map(function1).map(function2).run();
        let right = failing_or_pure(value).map(move |x| function2(function1(x))).run();

        prop_assert_eq!(left, right);
    }
}

// =============================================================================
// Monad Laws
// =============================================================================

proptest! {
    /// Left Identity Law: pure(a).flat_map(f) == f(a)
    #[test]
    fn prop_effect_monad_left_identity(value: i32) {
        prop_assert_eq!(
            Effect::pure(value).flat_map(failing_or_pure).run(),
            failing_or_pure(value).run()
        );
    }

    /// Right Identity Law: m.flat_map(pure) == m
    #[test]
    fn prop_effect_monad_right_identity(value: i32) {
        let effect = failing_or_pure(value);
        prop_assert_eq!(effect.clone().flat_map(Effect::pure).run(), effect.run());
    }

    /// Associativity Law: m.flat_map(f).flat_map(g) == m.flat_map(|x| f(x).flat_map(g))
    #[test]
    fn prop_effect_monad_associativity(value: i32) {
        let function1 = |n: i32| failing_or_pure(n.wrapping_add(1));
        let function2 = |n: i32| Effect::pure(n.wrapping_mul(2));

        let left = Effect::pure(value).flat_map(function1).flat_map(function2).run();
        let right = Effect::pure(value)
            .flat_map(move |x| function1(x).flat_map(function2))
            .run();

        prop_assert_eq!(left, right);
    }
}

// =============================================================================
// Error Handling Laws
// =============================================================================

proptest! {
    /// Catching a pure effect is a no-op.
    #[test]
    fn prop_effect_catch_pure_is_identity(value: i32) {
        prop_assert_eq!(Effect::pure(value).catch(|_| Effect::pure(0)).run(), Ok(value));
    }

    /// Catching a failure is the same as running the handler on it.
    #[test]
    fn prop_effect_catch_fail_runs_handler(message in "[a-z]{1,12}") {
        let handler = |error: Error| Effect::pure(error.to_string().len());
        prop_assert_eq!(
            Effect::<usize>::fail(message.clone()).catch(handler).run(),
            handler(Error::failure(message)).run()
        );
    }

    /// attempt never raises a domain failure.
    #[test]
    fn prop_effect_attempt_captures(value: i32) {
        let captured = failing_or_pure(value).attempt().run();
        prop_assert!(captured.is_ok());
        prop_assert_eq!(captured.unwrap_or_else(Err), failing_or_pure(value).run());
    }
}
