//! Cell identity and staleness states.
//!
//! Every reactive cell (signal, computed, or effect) is identified by a
//! `CellId` and carries a staleness state that drives the push-pull update
//! scheme: writes push `MaybeDirty` marks through the graph, reads pull
//! values fresh by resolving those marks.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::error::ReactiveError;

/// Unique identifier for a reactive cell.
///
/// Each cell (signal, computed, or effect) gets a unique ID when created.
/// IDs are how the dependency graph refers to cells without keeping them
/// alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    /// Generate a new unique cell ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness state of a derived cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency might have changed. The cell re-checks dependency
    /// versions on the next read before deciding whether to recompute.
    MaybeDirty,

    /// The cell definitely needs to recompute on the next read.
    Dirty,
}

/// Graph-facing surface of a reactive cell.
///
/// The registry holds every live cell as a `Weak<dyn ReactiveNode>`, so
/// propagation and edge validation can drive cells without knowing their
/// value types.
pub(crate) trait ReactiveNode: Send + Sync {
    /// The cell's identity in the registry.
    fn id(&self) -> CellId;

    /// Monotonic version counter, bumped exactly when the cell's value
    /// observably changes.
    fn version(&self) -> u64;

    /// Bring the cell up to date: recompute a stale derived cell, re-run an
    /// effect whose dependencies moved, no-op for a source cell.
    fn refresh(&self) -> Result<(), ReactiveError>;

    /// Mark the cell as possibly stale. Returns `true` only when the cell
    /// was clean before, meaning its own dependents still need visiting.
    fn mark_maybe_dirty(&self) -> bool;

    /// Eager cells are queued for the next flush instead of being marked.
    fn is_eager(&self) -> bool;

    /// Snapshot of the cells currently subscribed to this one.
    fn dependents(&self) -> SmallVec<[CellId; 8]>;

    /// Drop `id` from this cell's dependent set.
    fn remove_dependent(&self, id: CellId);
}
