//! Resource tracking for scoped execution.
//!
//! A [`ResourceRegistry`] records every [`Disposable`] acquired while an
//! [`Env`](super::Env) is active. When the scope ends the registry is either
//! merged into its parent (success) or released (failure), so exactly one
//! scope ever disposes a given resource.
//!
//! # Ownership
//!
//! - Entries are *owned* by exactly one registry.
//! - A registry created for a fork is *seeded* with a read-only view of its
//!   parent's entries. They are visible through [`ResourceRegistry::get`] and
//!   [`ResourceRegistry::contains`] but are never released by the fork.
//! - Entries are released in reverse acquisition order.
//! - A registry dropped while it still owns entries releases them.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::effect::Error;

/// Something that must be cleaned up exactly once.
pub trait Disposable: Send + Sync {
    /// Releases the underlying resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource could not be released cleanly.
    fn dispose(&self) -> Result<(), Error>;
}

/// A [`Disposable`] built from a one-shot closure.
///
/// The closure runs on the first call to `dispose`; later calls do nothing.
///
/// # Examples
///
/// ```rust
/// use effector::env::{Disposable, Disposer};
///
/// let disposer = Disposer::new(|| Ok(()));
/// assert!(disposer.dispose().is_ok());
/// assert!(disposer.is_disposed());
/// ```
pub struct Disposer<F> {
    release: Mutex<Option<F>>,
}

impl<F> Disposer<F>
where
    F: FnOnce() -> Result<(), Error> + Send,
{
    /// Wraps `release` as a disposable.
    pub const fn new(release: F) -> Self {
        Self {
            release: Mutex::new(Some(release)),
        }
    }

    /// Returns `true` once the closure has run.
    pub fn is_disposed(&self) -> bool {
        self.release.lock().is_none()
    }
}

impl<F> Disposable for Disposer<F>
where
    F: FnOnce() -> Result<(), Error> + Send,
{
    fn dispose(&self) -> Result<(), Error> {
        let release = self.release.lock().take();
        release.map_or(Ok(()), |release| release())
    }
}

impl<F> fmt::Debug for Disposer<F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Disposer")
            .field("disposed", &self.release.lock().is_none())
            .finish()
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "resource#{}", self.0)
    }
}

/// A typed handle to a resource tracked by a registry.
///
/// Dereferences to the resource. Cloning the handle does not duplicate the
/// resource; the registry entry stays the single owner of its release.
pub struct Acquired<R> {
    id: ResourceId,
    resource: Arc<R>,
}

impl<R> Acquired<R> {
    /// Returns the registry id of this resource.
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the shared resource.
    pub const fn resource(&self) -> &Arc<R> {
        &self.resource
    }
}

impl<R> Clone for Acquired<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<R> Deref for Acquired<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: fmt::Debug> fmt::Debug for Acquired<R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Acquired")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    id: ResourceId,
    resource: Arc<dyn Disposable>,
}

/// The ordered set of resources acquired within one scope.
#[derive(Default)]
pub struct ResourceRegistry {
    owned: Vec<Entry>,
    inherited: Arc<[Entry]>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that can see every entry visible to
    /// `parent`, without owning any of them.
    pub fn seeded_from(parent: &Self) -> Self {
        let inherited: Vec<Entry> = parent
            .inherited
            .iter()
            .chain(parent.owned.iter())
            .cloned()
            .collect();
        Self {
            owned: Vec::new(),
            inherited: Arc::from(inherited),
        }
    }

    /// Starts tracking `resource` and returns its id.
    pub fn track(&mut self, resource: Arc<dyn Disposable>) -> ResourceId {
        let id = ResourceId::next();
        self.owned.push(Entry { id, resource });
        id
    }

    /// Starts tracking `resource` and returns a typed handle to it.
    pub fn acquire<R>(&mut self, resource: R) -> Acquired<R>
    where
        R: Disposable + 'static,
    {
        let resource = Arc::new(resource);
        let id = self.track(Arc::clone(&resource) as Arc<dyn Disposable>);
        Acquired { id, resource }
    }

    /// Returns the number of resources this registry owns.
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    /// Returns `true` if this registry owns no resources.
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Returns the number of inherited, read-only entries.
    pub fn inherited_len(&self) -> usize {
        self.inherited.len()
    }

    /// Returns `true` if `id` is owned by this registry.
    pub fn owns(&self, id: ResourceId) -> bool {
        self.owned.iter().any(|entry| entry.id == id)
    }

    /// Returns `true` if `id` is owned or inherited.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.get(id).is_some()
    }

    /// Looks up an owned or inherited resource.
    pub fn get(&self, id: ResourceId) -> Option<Arc<dyn Disposable>> {
        self.owned
            .iter()
            .rev()
            .chain(self.inherited.iter())
            .find(|entry| entry.id == id)
            .map(|entry| Arc::clone(&entry.resource))
    }

    /// Ids of owned resources, in acquisition order.
    pub fn ids(&self) -> Vec<ResourceId> {
        self.owned.iter().map(|entry| entry.id).collect()
    }

    /// Releases one owned resource early.
    ///
    /// Returns `Ok(false)` if `id` is not owned here (including inherited
    /// entries, which belong to an ancestor).
    ///
    /// # Errors
    ///
    /// Returns the error raised by the resource's `dispose`.
    pub fn release(&mut self, id: ResourceId) -> Result<bool, Error> {
        let Some(position) = self.owned.iter().position(|entry| entry.id == id) else {
            return Ok(false);
        };
        let entry = self.owned.remove(position);
        entry.resource.dispose()?;
        Ok(true)
    }

    /// Releases every owned resource in reverse acquisition order.
    ///
    /// Every resource is released even if some fail; the first failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a `dispose` call.
    pub fn release_all(&mut self) -> Result<(), Error> {
        let mut first_error = None;
        while let Some(entry) = self.owned.pop() {
            if let Err(error) = entry.resource.dispose() {
                tracing::warn!(resource = %entry.id, %error, "failed to release resource");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Moves every owned resource into `parent`, preserving order.
    ///
    /// Inherited entries are left behind; `parent` already sees them.
    pub fn merge_into(mut self, parent: &mut Self) {
        parent.owned.append(&mut self.owned);
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if !self.owned.is_empty() {
            tracing::debug!(count = self.owned.len(), "releasing resources of dropped registry");
            let _ = self.release_all();
        }
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResourceRegistry")
            .field("owned", &self.ids())
            .field("inherited", &self.inherited.len())
            .finish()
    }
}
