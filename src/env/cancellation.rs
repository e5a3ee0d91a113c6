//! Cooperative, hierarchical cancellation.
//!
//! A [`CancellationSignal`] is a monotonic flag: once raised it never resets.
//! Signals form a tree. Cancelling a parent cancels every descendant, while
//! cancelling a child leaves its parent untouched.
//!
//! Nothing is interrupted preemptively. The interpreter checks the signal at
//! every step boundary, and every blocking wait in the runtime (schedule
//! delays, joins, posts, async steps) wakes up when the signal fires.
//!
//! # Examples
//!
//! ```rust
//! use effector::env::CancellationSignal;
//!
//! let parent = CancellationSignal::new();
//! let child = parent.child();
//!
//! child.cancel();
//! assert!(child.is_cancelled());
//! assert!(!parent.is_cancelled());
//!
//! let other_child = parent.child();
//! parent.cancel();
//! assert!(other_child.is_cancelled());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::effect::Error;
use crate::runtime;

type Callback = Box<dyn FnOnce() + Send>;

struct SignalState {
    callbacks: FxHashMap<u64, Callback>,
    next_key: u64,
}

struct SignalInner {
    cancelled: AtomicBool,
    state: Mutex<SignalState>,
    condvar: Condvar,
    notify: Notify,
    /// Keeps this signal linked to its parent; dropping it unlinks.
    parent_link: Option<Registration>,
}

impl SignalInner {
    fn new(parent_link: Option<Registration>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            state: Mutex::new(SignalState {
                callbacks: FxHashMap::default(),
                next_key: 0,
            }),
            condvar: Condvar::new(),
            notify: Notify::new(),
            parent_link,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }

        let callbacks = {
            let mut state = self.state.lock();
            self.condvar.notify_all();
            std::mem::take(&mut state.callbacks)
        };
        self.notify.notify_waiters();

        let mut callbacks: Vec<_> = callbacks.into_iter().collect();
        callbacks.sort_unstable_by_key(|(key, _)| *key);
        for (_, callback) in callbacks {
            callback();
        }
        true
    }
}

/// A cooperative, hierarchical, monotonic cancellation flag.
///
/// Cloning a signal yields another handle to the same flag.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

impl CancellationSignal {
    /// Creates a root signal with no parent.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner::new(None)),
        }
    }

    /// Creates a signal that is cancelled whenever `self` is.
    ///
    /// If `self` is already cancelled the child starts out cancelled.
    pub fn child(&self) -> Self {
        let inner = Arc::new_cyclic(|child: &Weak<SignalInner>| {
            let child = child.clone();
            let link = self.on_cancel(move || {
                if let Some(child) = child.upgrade() {
                    child.cancel();
                }
            });
            SignalInner::new(link)
        });
        let child = Self { inner };
        // The link callback cannot reach a child that is still being built.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Raises the signal.
    ///
    /// Returns `true` if this call raised it, `false` if it was already
    /// raised. Safe to call concurrently from any number of threads.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Returns `true` once the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns `Err(Error::Cancelled)` once the signal has been raised.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the signal is raised.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns `true` if this signal is linked to a parent.
    pub fn has_parent(&self) -> bool {
        self.inner.parent_link.is_some()
    }

    /// Runs `callback` when the signal is raised.
    ///
    /// If the signal is already raised the callback runs immediately on the
    /// calling thread and `None` is returned. Otherwise the returned
    /// [`Registration`] keeps the callback armed; dropping it disarms it.
    pub fn on_cancel<F>(&self, callback: F) -> Option<Registration>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if !self.is_cancelled() {
                let key = state.next_key;
                state.next_key += 1;
                state.callbacks.insert(key, Box::new(callback));
                return Some(Registration {
                    signal: Arc::downgrade(&self.inner),
                    key,
                });
            }
        }
        callback();
        None
    }

    /// Blocks the calling thread for up to `timeout`, waking early if the
    /// signal is raised.
    ///
    /// Returns `true` if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        while !self.is_cancelled() {
            match deadline {
                Some(deadline) => {
                    if self.inner.condvar.wait_until(&mut state, deadline).timed_out() {
                        return self.is_cancelled();
                    }
                }
                None => self.inner.condvar.wait(&mut state),
            }
        }
        true
    }

    /// Resolves once the signal is raised.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            loop {
                let notified = inner.notify.notified();
                if inner.is_cancelled() {
                    return;
                }
                notified.await;
            }
        }
    }

    /// Raises the signal after `delay`, unless every handle to it has been
    /// dropped by then.
    ///
    /// The timer runs on the shared runtime, so it fires even while the
    /// caller is blocked. The returned [`Deadline`] can disarm it early;
    /// dropping the deadline leaves the timer armed.
    pub fn cancel_after(&self, delay: Duration) -> Deadline {
        let signal = Arc::downgrade(&self.inner);
        let timer = runtime::global().spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = signal.upgrade() {
                if inner.cancel() {
                    tracing::debug!(?delay, "cancellation deadline reached");
                }
            }
        });
        Deadline { timer }
    }
}

/// A pending [`CancellationSignal::cancel_after`] timer.
#[derive(Debug)]
pub struct Deadline {
    timer: JoinHandle<()>,
}

impl Deadline {
    /// Stops the timer without raising the signal.
    ///
    /// Does nothing once the deadline has already fired.
    pub fn disarm(self) {
        self.timer.abort();
    }

    /// Returns `true` once the timer has fired or been disarmed.
    pub fn is_finished(&self) -> bool {
        self.timer.is_finished()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .field("has_parent", &self.has_parent())
            .finish()
    }
}

/// Keeps an [`on_cancel`](CancellationSignal::on_cancel) callback armed.
///
/// Dropping the registration removes the callback without running it.
pub struct Registration {
    signal: Weak<SignalInner>,
    key: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(inner) = self.signal.upgrade() {
            // Dropped after the lock is released; callbacks may own arbitrary state.
            let removed = inner.state.lock().callbacks.remove(&self.key);
            drop(removed);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registration")
            .field("key", &self.key)
            .finish()
    }
}
