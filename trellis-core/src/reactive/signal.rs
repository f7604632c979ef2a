//! Source cells.
//!
//! `RawSignal<T>` is the engine's mutable cell: a value, a version counter,
//! and the set of cells currently subscribed to it. A tracked read records
//! the cell and its version with the active subscriber; a value-changing
//! write bumps the version and pushes a staleness wave through the
//! dependency graph.
//!
//! Writes of a value equal to the current one are no-ops: no version bump,
//! no propagation. Downstream cells therefore only revalidate when
//! something observably moved.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::batch;
use super::context;
use super::error::ReactiveError;
use super::node::{CellId, ReactiveNode};
use super::runtime;

/// A mutable source cell holding a value of type `T`.
///
/// Handles are cheap clones sharing one backing cell; the cell stays in the
/// registry until the last handle drops. Reads subscribe the active
/// computation, writes notify dependents (deferred while a batch is open).
pub struct RawSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<SignalState<T>>,
}

struct SignalState<T> {
    /// Identity of this cell in the dependency graph.
    id: CellId,

    /// The current value.
    value: RwLock<T>,

    /// Bumped on every value-changing write. Dependents compare this
    /// against the version they recorded at read time.
    version: AtomicU64,

    /// Cells subscribed to this one, in subscription order.
    dependents: RwLock<IndexSet<CellId>>,
}

impl<T> RawSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new source cell seeded with `value`.
    pub fn new(value: T) -> Self {
        let inner = Arc::new(SignalState {
            id: CellId::new(),
            value: RwLock::new(value),
            version: AtomicU64::new(0),
            dependents: RwLock::new(IndexSet::new()),
        });
        runtime::register(inner.id, Arc::downgrade(&inner) as Weak<dyn ReactiveNode>);
        Self { inner }
    }

    /// Identity of the backing cell.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Read the current value, subscribing the active computation.
    pub fn read(&self) -> T {
        let version = self.inner.version.load(Ordering::Acquire);
        if let Some(subscriber) = context::record_read(self.inner.id, version) {
            self.inner.dependents.write().insert(subscriber);
        }
        self.inner.value.read().clone()
    }

    /// Read the current value without touching the subscriber slot.
    pub fn read_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Store a new value and notify dependents.
    ///
    /// Writing a value equal to the current one is a no-op. Affected
    /// effects run before this returns unless a batch is open, in which
    /// case they run when the outermost batch closes.
    pub fn write(&self, value: T) {
        let changed = {
            let mut current = self.inner.value.write();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if !changed {
            return;
        }

        let version = self.inner.version.fetch_add(1, Ordering::Release) + 1;
        tracing::trace!("signal cell {} wrote version {version}", self.inner.id.raw());

        runtime::propagate(self.inner.id);
        batch::flush_if_idle();
    }

    /// Number of cells currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dependents.read().len()
    }
}

impl<T> ReactiveNode for SignalState<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn id(&self) -> CellId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        // Source cells are always fresh.
        Ok(())
    }

    fn mark_maybe_dirty(&self) -> bool {
        // Source cells have no upstream, so they are never stale.
        false
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn dependents(&self) -> SmallVec<[CellId; 8]> {
        self.dependents.read().iter().copied().collect()
    }

    fn remove_dependent(&self, id: CellId) {
        self.dependents.write().shift_remove(&id);
    }
}

impl<T> Drop for SignalState<T> {
    fn drop(&mut self) {
        runtime::deregister(self.id);
    }
}

impl<T> Clone for RawSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for RawSignal<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSignal")
            .field("id", &self.inner.id)
            .field("value", &self.read_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::reactive::context::TrackingGuard;

    #[test]
    fn read_returns_latest_write() {
        let cell = RawSignal::new(String::from("a"));
        assert_eq!(cell.read(), "a");

        cell.write(String::from("b"));
        cell.write(String::from("c"));
        assert_eq!(cell.read(), "c");
    }

    #[test]
    fn equal_write_is_a_noop() {
        let cell = RawSignal::new(5);
        let before = cell.inner.version.load(Ordering::Acquire);

        cell.write(5);
        assert_eq!(cell.inner.version.load(Ordering::Acquire), before);

        cell.write(6);
        assert_eq!(cell.inner.version.load(Ordering::Acquire), before + 1);
    }

    #[test]
    fn tracked_read_registers_the_active_subscriber() {
        let cell = RawSignal::new(1);
        let subscriber = CellId::new();

        let scope = TrackingGuard::enter(subscriber);
        assert_eq!(cell.read(), 1);
        let reads = scope.finish();

        assert_eq!(reads.get(&cell.id()), Some(&0));
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn untracked_read_registers_nothing() {
        let cell = RawSignal::new(1);
        let subscriber = CellId::new();

        let scope = TrackingGuard::enter(subscriber);
        assert_eq!(cell.read_untracked(), 1);
        let reads = scope.finish();

        assert!(reads.is_empty());
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_one_cell() {
        let a = RawSignal::new(1);
        let b = a.clone();

        b.write(9);
        assert_eq!(a.read(), 9);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn ids_are_unique() {
        let a = RawSignal::new(0);
        let b = RawSignal::new(0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn dropping_the_last_handle_deregisters() {
        let cell = RawSignal::new(1);
        let id = cell.id();
        assert!(runtime::resolve(id).is_some());

        drop(cell);
        assert!(runtime::resolve(id).is_none());
    }
}
