//! Derived cells.
//!
//! `RawComputed<T>` caches the result of a getter over other cells. It is
//! lazy: construction stores the getter without running it, and a read only
//! recomputes when a staleness mark is confirmed by an actual dependency
//! change.
//!
//! # Staleness Resolution
//!
//! An upstream write marks the cell `MaybeDirty`. The next read walks the
//! dependency edges recorded during the last evaluation, in read order,
//! refreshing each dependency and comparing its version against the one
//! recorded at read time. The first moved version triggers a recompute; if
//! none moved, the mark is cleared without running the getter. A recompute
//! whose result equals the previous value keeps the old version, so
//! stabilized values never cascade further downstream.
//!
//! # Cycles
//!
//! A getter that reads its own cell, directly or through other cells, would
//! recurse forever. Each thread keeps a stack of the cells it is currently
//! evaluating; a read that finds its own cell on that stack reports
//! [`ReactiveError::Cycle`] instead of recursing.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context::{self, TrackingGuard};
use super::error::ReactiveError;
use super::node::{CellId, DirtyState, ReactiveNode};
use super::runtime;

thread_local! {
    /// Cells currently evaluating on this thread, innermost last.
    static EVALUATING: RefCell<Vec<CellId>> = RefCell::new(Vec::new());
}

fn is_evaluating(id: CellId) -> bool {
    EVALUATING.with(|stack| stack.borrow().contains(&id))
}

/// Marks a cell as evaluating on this thread for the guard's lifetime.
struct EvalGuard {
    id: CellId,
}

impl EvalGuard {
    fn enter(id: CellId) -> Self {
        EVALUATING.with(|stack| stack.borrow_mut().push(id));
        Self { id }
    }
}

impl Drop for EvalGuard {
    fn drop(&mut self) {
        EVALUATING.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped, Some(self.id), "evaluation stack out of order");
        });
    }
}

type Getter<T> = dyn Fn(Option<&T>) -> T + Send + Sync;

/// A derived cell computing its value from other cells.
///
/// The getter receives the previously cached value (`None` on the first
/// evaluation) and is re-run only when a dependency observably changed.
/// Handles are cheap clones sharing one backing cell.
pub struct RawComputed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedState<T>>,
}

struct ComputedState<T> {
    /// Identity of this cell in the dependency graph.
    id: CellId,

    /// Pure derivation over whatever cells it reads.
    getter: Box<Getter<T>>,

    /// Cached result of the last evaluation; `None` until the first read.
    value: RwLock<Option<T>>,

    /// Bumped only when an evaluation produces an observably different
    /// value.
    version: AtomicU64,

    /// Where this cell sits between fresh and known-stale.
    state: RwLock<DirtyState>,

    /// Dependency edges recorded during the last evaluation, in read
    /// order, each stamped with the version seen at read time.
    edges: RwLock<SmallVec<[(CellId, u64); 8]>>,

    /// Cells subscribed to this one, in subscription order.
    dependents: RwLock<IndexSet<CellId>>,
}

impl<T> RawComputed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a derived cell over `getter`. Nothing runs until the first
    /// read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(Option<&T>) -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedState {
            id: CellId::new(),
            getter: Box::new(getter),
            value: RwLock::new(None),
            version: AtomicU64::new(0),
            state: RwLock::new(DirtyState::Dirty),
            edges: RwLock::new(SmallVec::new()),
            dependents: RwLock::new(IndexSet::new()),
        });
        runtime::register(inner.id, Arc::downgrade(&inner) as Weak<dyn ReactiveNode>);
        Self { inner }
    }

    /// Identity of the backing cell.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Read the current value, recomputing if stale and subscribing the
    /// active computation. Panics if the evaluation reaches a cycle.
    pub fn read(&self) -> T {
        self.try_read().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible form of [`read`](Self::read): a cyclic evaluation comes
    /// back as [`ReactiveError::Cycle`] instead of a panic.
    pub fn try_read(&self) -> Result<T, ReactiveError> {
        self.inner.ensure_fresh()?;

        let version = self.inner.version.load(Ordering::Acquire);
        if let Some(subscriber) = context::record_read(self.inner.id, version) {
            self.inner.dependents.write().insert(subscriber);
        }

        Ok(self
            .inner
            .value
            .read()
            .clone()
            .expect("fresh computed cell holds a value"))
    }

    /// Read the current value without subscribing anything. Staleness is
    /// still resolved first.
    pub fn read_untracked(&self) -> T {
        if let Err(err) = self.inner.ensure_fresh() {
            panic!("{err}");
        }
        self.inner
            .value
            .read()
            .clone()
            .expect("fresh computed cell holds a value")
    }

    /// Where this cell currently sits between fresh and known-stale.
    pub fn dirty_state(&self) -> DirtyState {
        *self.inner.state.read()
    }

    /// Whether the getter has produced a value yet.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of cells currently subscribed.
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.read().len()
    }
}

impl<T> ComputedState<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Resolve staleness so the cache holds a current value.
    fn ensure_fresh(&self) -> Result<(), ReactiveError> {
        if is_evaluating(self.id) {
            return Err(ReactiveError::Cycle(self.id));
        }

        let state = *self.state.read();
        match state {
            DirtyState::Clean => Ok(()),
            DirtyState::Dirty => {
                self.recompute();
                Ok(())
            }
            DirtyState::MaybeDirty => {
                let edges = self.edges.read().clone();
                if runtime::dependencies_changed(&edges)? {
                    self.recompute();
                } else {
                    *self.state.write() = DirtyState::Clean;
                    tracing::trace!(
                        "computed cell {} revalidated without recompute",
                        self.id.raw()
                    );
                }
                Ok(())
            }
        }
    }

    /// Run the getter under a fresh tracking scope and commit the result.
    ///
    /// No locks are held while the getter runs; the previous value is
    /// cloned out first and the new edges are committed afterward.
    fn recompute(&self) {
        let _eval = EvalGuard::enter(self.id);

        // Detach from the previous evaluation's dependencies; the getter
        // re-subscribes to whatever it actually reads this time.
        let old_edges = std::mem::take(&mut *self.edges.write());
        runtime::detach(self.id, &old_edges);

        let previous = self.value.read().clone();
        let scope = TrackingGuard::enter(self.id);
        let next = (self.getter)(previous.as_ref());
        let reads = scope.finish();

        *self.edges.write() = reads.into_iter().collect();

        let changed = previous.as_ref() != Some(&next);
        *self.value.write() = Some(next);
        if changed {
            self.version.fetch_add(1, Ordering::Release);
        }
        *self.state.write() = DirtyState::Clean;

        tracing::trace!(
            "computed cell {} recomputed (changed: {changed})",
            self.id.raw()
        );
    }
}

impl<T> ReactiveNode for ComputedState<T>
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
        self.ensure_fresh()
    }

    fn mark_maybe_dirty(&self) -> bool {
        let mut state = self.state.write();
        if *state == DirtyState::Clean {
            *state = DirtyState::MaybeDirty;
            true
        } else {
            false
        }
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

impl<T> Drop for ComputedState<T> {
    fn drop(&mut self) {
        runtime::deregister(self.id);
        let edges = std::mem::take(self.edges.get_mut());
        runtime::detach(self.id, &edges);
    }
}

impl<T> Clone for RawComputed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for RawComputed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawComputed")
            .field("id", &self.inner.id)
            .field("state", &self.dirty_state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
