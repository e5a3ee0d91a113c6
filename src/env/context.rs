//! Synchronization contexts.
//!
//! A [`SyncContext`] is somewhere work can be marshalled to, typically a
//! thread that owns state which must not be touched from elsewhere.
//! [`Effect::post`](crate::effect::Effect::post) hands the rest of an effect
//! to the context captured in the current [`Env`](super::Env).

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

use crate::effect::Error;

/// A unit of work posted to a [`SyncContext`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A target that accepts work to run elsewhere.
///
/// Implementations must eventually either run or drop every posted job.
/// Dropping a job without running it is reported to the poster as
/// [`Error::Bottom`].
pub trait SyncContext: Send + Sync {
    /// Schedules `job` to run on this context.
    fn post(&self, job: Job);

    /// Returns `true` if the calling thread already runs this context's
    /// jobs. Posting from such a thread runs the work inline.
    fn is_current(&self) -> bool {
        false
    }

    /// A short name for logs.
    fn name(&self) -> &str {
        "sync-context"
    }
}

/// A [`SyncContext`] backed by one dedicated, named thread.
///
/// Jobs run one at a time in posting order. The thread exits once the last
/// handle to the context is dropped and the queue is drained.
///
/// # Examples
///
/// ```rust
/// use effector::effect::Effect;
/// use effector::env::{DedicatedContext, Env};
///
/// let context = DedicatedContext::spawn("ui").expect("spawn context");
/// let mut env = Env::new().with_context(context.clone());
///
/// let on_context = Effect::lift(|| std::thread::current().name().map(str::to_owned)).post();
/// assert_eq!(on_context.run_with(&mut env).unwrap().as_deref(), Some("ui"));
/// ```
pub struct DedicatedContext {
    name: String,
    sender: mpsc::UnboundedSender<Job>,
    thread: ThreadId,
}

impl DedicatedContext {
    /// Starts the context thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system refuses to spawn the thread.
    pub fn spawn(name: impl Into<String>) -> Result<Arc<Self>, Error> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!(context = %thread_name, "sync context started");
            while let Some(job) = receiver.blocking_recv() {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    tracing::warn!(
                        context = %thread_name,
                        error = %Error::from_panic(panic),
                        "job panicked on sync context"
                    );
                }
            }
            tracing::debug!(context = %thread_name, "sync context stopped");
        })?;

        Ok(Arc::new(Self {
            name,
            sender,
            thread: handle.thread().id(),
        }))
    }
}

impl SyncContext for DedicatedContext {
    fn post(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!(context = %self.name, "sync context is gone; job dropped");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for DedicatedContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DedicatedContext")
            .field("name", &self.name)
            .field("thread", &self.thread)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[rstest]
    fn test_jobs_run_in_order_on_named_thread() {
        let context = DedicatedContext::spawn("ordered").expect("spawn");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_sender, done) = std_mpsc::channel();

        for index in 0..3 {
            let seen = Arc::clone(&seen);
            context.post(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                seen.lock().push((index, name));
            }));
        }
        context.post(Box::new(move || {
            done_sender.send(()).expect("signal done");
        }));

        done.recv_timeout(Duration::from_secs(5)).expect("jobs finished");
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        for (position, (index, name)) in seen.iter().enumerate() {
            assert_eq!(*index, position);
            assert_eq!(name.as_deref(), Some("ordered"));
        }
    }

    #[rstest]
    fn test_is_current_only_on_context_thread() {
        let context = DedicatedContext::spawn("current").expect("spawn");
        assert!(!context.is_current());

        let (sender, receiver) = std_mpsc::channel();
        let inner = Arc::clone(&context);
        context.post(Box::new(move || {
            sender.send(inner.is_current()).expect("send");
        }));
        assert!(receiver.recv_timeout(Duration::from_secs(5)).expect("answer"));
    }

    #[rstest]
    fn test_panicking_job_does_not_stop_context() {
        let context = DedicatedContext::spawn("resilient").expect("spawn");
        let (sender, receiver) = std_mpsc::channel();
        context.post(Box::new(|| panic!("job failure")));
        context.post(Box::new(move || {
            sender.send(42).expect("send");
        }));
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(42));
    }
}
