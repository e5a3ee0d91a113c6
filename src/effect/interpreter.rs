//! The trampolined interpreter.
//!
//! [`drive`] evaluates a [`Node`] tree with an explicit frame stack instead
//! of native recursion. `Bind` and `Catch` push a frame and descend into
//! their source; finished values and errors then unwind the stack one frame
//! at a time. A continuation that returns another node resumes the descent.
//!
//! # Stack Safety
//!
//! Native stack depth is constant regardless of how deep the chain is or
//! how it is associated: left-nested chains grow the frame stack, while
//! right-nested chains and [`Transition::Recurse`] loops replace the current
//! node in place.
//!
//! # Cancellation
//!
//! The signal is checked before every node and before every continuation.
//! Once it is raised no further user code runs except finalizers, which the
//! scope combinators run in a detached environment. Catch frames never see
//! [`Error::Cancelled`].

use smallvec::SmallVec;

use super::Error;
use super::computation::{Continuation, Handler, Node, Transition, Value};
use crate::env::Env;
use crate::runtime;

enum Frame {
    Bind(Continuation),
    Catch(Handler),
}

type Stack = SmallVec<[Frame; 8]>;

/// Evaluates `node` against `env` until it produces a value or an error.
pub(crate) fn drive(node: Node, env: &mut Env) -> Result<Value, Error> {
    let mut stack = Stack::new();
    let mut current = node;
    loop {
        let outcome = evaluate(current, env, &mut stack);
        match unwind(outcome, env, &mut stack) {
            Resume::Done(outcome) => return outcome,
            Resume::Continue(next) => current = next,
        }
    }
}

enum Resume {
    Done(Result<Value, Error>),
    Continue(Node),
}

/// Descends into `node`, pushing frames, until a leaf produces an outcome.
fn evaluate(mut node: Node, env: &mut Env, stack: &mut Stack) -> Result<Value, Error> {
    loop {
        env.check_cancelled()?;
        node = match node {
            Node::Pure(value) => return Ok(value()),
            Node::Fail(error) => return Err(error),
            Node::Sync(thunk) => return thunk(env),
            Node::Async(thunk) => return runtime::block_on_cancellable(thunk(env), env.signal()),
            Node::Step(step) => match step(env)? {
                Transition::Complete(value) => return Ok(value),
                Transition::Recurse(next) => next,
            },
            Node::Bind(source, continuation) => {
                stack.push(Frame::Bind(continuation));
                source.into_node()
            }
            Node::Catch(source, handler) => {
                stack.push(Frame::Catch(handler));
                source.into_node()
            }
        };
    }
}

/// Feeds `outcome` through the frame stack until a frame yields another
/// node to evaluate or the stack empties.
fn unwind(mut outcome: Result<Value, Error>, env: &Env, stack: &mut Stack) -> Resume {
    while let Some(frame) = stack.pop() {
        let transition = match (frame, outcome) {
            (Frame::Bind(continuation), Ok(value)) => match env.check_cancelled() {
                Ok(()) => continuation(value),
                Err(cancelled) => Err(cancelled),
            },
            (Frame::Catch(handler), Err(error)) if !error.is_cancelled() => handler(error),
            (_, passthrough) => {
                outcome = passthrough;
                continue;
            }
        };
        outcome = match transition {
            Ok(Transition::Complete(value)) => Ok(value),
            Ok(Transition::Recurse(next)) => return Resume::Continue(next),
            Err(error) => Err(error),
        };
    }
    Resume::Done(outcome)
}
