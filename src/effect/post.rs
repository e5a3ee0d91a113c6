//! Marshalling effects onto a synchronization context.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::computation::{Node, Value};
use super::scope::release;
use super::{Effect, Error, interpreter};
use crate::env::ResourceRegistry;
use crate::runtime::Completion;

impl<A: Send + 'static> Effect<A> {
    /// Runs this effect on the environment's captured [`SyncContext`].
    ///
    /// Without a context, or when already on it, the effect runs inline.
    /// Otherwise the calling thread waits for the posted work, which runs in
    /// a child scope whose resources are handed back on success and
    /// released on failure.
    ///
    /// If the caller is cancelled while waiting, the wait is abandoned with
    /// [`Error::Cancelled`]. The posted work is not aborted but observes the
    /// cancellation at its next step.
    ///
    /// [`SyncContext`]: crate::env::SyncContext
    pub fn post(self) -> Self {
        let body = self.into_link();
        Self::from_node(Node::Sync(Arc::new(move |env| {
            let context = match env.context() {
                Some(context) if !context.is_current() => Arc::clone(context),
                _ => return interpreter::drive(body.node(), env),
            };

            let mut remote = env.local();
            let remote_body = body.node();
            let (completer, completion) = Completion::<Result<(Value, ResourceRegistry), Error>>::pair();
            tracing::debug!(context = context.name(), "posting effect to sync context");
            context.post(Box::new(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| interpreter::drive(remote_body, &mut remote)))
                    .unwrap_or_else(|panic| Err(Error::from_panic(panic)));
                match outcome {
                    Ok(value) => completer.complete(Ok((value, remote.into_resources()))),
                    Err(error) => completer.complete(release(remote, Err(error))),
                }
            }));

            let (value, resources) = completion.wait_take(env.signal())??;
            resources.merge_into(env.resources_mut());
            Ok(value)
        })))
    }
}
