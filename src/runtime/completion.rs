//! One-shot completion slots with cancellable waits.
//!
//! A [`Completer`] publishes exactly one value; any number of
//! [`Completion`] handles can block until it arrives. Waits are guarded by a
//! [`CancellationSignal`]: if the waiter's signal fires first, the wait is
//! abandoned with [`Error::Cancelled`] while the producer keeps running.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::effect::Error;
use crate::env::CancellationSignal;

enum Slot<T> {
    Pending,
    Ready(T),
    Taken,
    Abandoned,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

impl<T> Shared<T> {
    fn publish(&self, slot: Slot<T>) {
        let mut current = self.slot.lock();
        if matches!(*current, Slot::Pending) {
            *current = slot;
            self.condvar.notify_all();
        }
    }
}

/// The producing half of a completion slot.
///
/// Dropping a completer without calling [`Completer::complete`] marks the
/// slot abandoned; waiters then observe [`Error::Bottom`].
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Completer<T> {
    /// Publishes `value` and wakes every waiter.
    pub fn complete(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.publish(Slot::Ready(value));
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.publish(Slot::Abandoned);
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Completer").finish_non_exhaustive()
    }
}

/// The waiting half of a completion slot.
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Creates a linked completer/completion pair.
    pub fn pair() -> (Completer<T>, Self) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Pending),
            condvar: Condvar::new(),
        });
        (
            Completer {
                shared: Some(Arc::clone(&shared)),
            },
            Self { shared },
        )
    }

    /// Returns `true` once a value was published or the completer was dropped.
    pub fn is_complete(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Pending)
    }

    /// Blocks until the value is available, then passes it to `read`.
    ///
    /// The value stays in the slot, so other waiters can read it too.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `signal` fires before the value arrives.
    /// - [`Error::Bottom`] if the completer was dropped without a value, or
    ///   the value was already taken.
    pub fn wait_with<R>(
        &self,
        signal: &CancellationSignal,
        read: impl FnOnce(&mut T) -> R,
    ) -> Result<R, Error> {
        let waker = Arc::clone(&self.shared);
        let _registration = signal.on_cancel(move || {
            let _slot = waker.slot.lock();
            waker.condvar.notify_all();
        });

        let mut slot = self.shared.slot.lock();
        loop {
            match &mut *slot {
                Slot::Ready(value) => return Ok(read(value)),
                Slot::Abandoned => {
                    return Err(Error::Bottom("producer finished without a value or an error"));
                }
                Slot::Taken => return Err(Error::Bottom("completion value already taken")),
                Slot::Pending => {}
            }
            if signal.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.shared.condvar.wait(&mut slot);
        }
    }

    /// Blocks until the value is available and moves it out of the slot.
    ///
    /// # Errors
    ///
    /// Same as [`Completion::wait_with`].
    pub fn wait_take(&self, signal: &CancellationSignal) -> Result<T, Error> {
        let slot = self.wait_with(signal, |_| ())
            .map(|()| std::mem::replace(&mut *self.shared.slot.lock(), Slot::Taken))?;
        match slot {
            Slot::Ready(value) => Ok(value),
            _ => Err(Error::Bottom("completion value already taken")),
        }
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.shared.slot.lock() {
            Slot::Pending => "pending",
            Slot::Ready(_) => "ready",
            Slot::Taken => "taken",
            Slot::Abandoned => "abandoned",
        };
        formatter
            .debug_struct("Completion")
            .field("state", &state)
            .finish()
    }
}
