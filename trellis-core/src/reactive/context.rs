//! Active-subscriber tracking.
//!
//! The engine tracks which computation is currently collecting dependencies
//! through a single thread-local slot. When a cell is read while the slot is
//! occupied, the read is recorded against the occupant. Evaluating a derived
//! cell swaps its own scope into the slot; suspending tracking swaps `None`
//! in. Every swap returns the previous occupant so callers can restore it,
//! and the guards in this module make that restore unwind-safe.
//!
//! # Why a single slot
//!
//! Nesting is expressed by the save/restore protocol rather than an implicit
//! stack: whoever swaps a scope in holds the previous occupant and puts it
//! back when done. This keeps `set_active_sub` an explicit, inspectable
//! primitive and makes suspension (`untracked`, `peek`) the same operation
//! as evaluation, just with `None` swapped in.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::node::CellId;

thread_local! {
    static ACTIVE_SUB: RefCell<Option<ActiveSub>> = RefCell::new(None);
}

/// The dependency-collection scope of one computation.
///
/// Holds the subscriber's cell ID and the cells it has read so far, each
/// stamped with the version observed at first read. A scope is created by
/// the engine when a derived cell or effect starts evaluating; it can be
/// moved out of and back into the slot via [`set_active_sub`], but not
/// constructed outside the engine.
#[derive(Debug)]
pub struct ActiveSub {
    /// The cell on whose behalf dependencies are being collected.
    subscriber: CellId,
    /// Cells read during this scope, with the version seen at first read.
    /// First read wins so one evaluation records each dependency once.
    reads: IndexMap<CellId, u64>,
}

impl ActiveSub {
    pub(crate) fn new(subscriber: CellId) -> Self {
        Self {
            subscriber,
            reads: IndexMap::new(),
        }
    }

    /// The cell this scope collects dependencies for.
    pub fn subscriber(&self) -> CellId {
        self.subscriber
    }

    /// Number of distinct cells read so far in this scope.
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }
}

/// Swap the active subscriber slot, returning the previous occupant.
///
/// Passing `None` suspends dependency collection. The caller is responsible
/// for restoring the returned value once done; dropping it instead detaches
/// the in-flight computation from everything it has read so far.
pub fn set_active_sub(sub: Option<ActiveSub>) -> Option<ActiveSub> {
    ACTIVE_SUB.with(|slot| slot.replace(sub))
}

/// The cell ID of the computation currently collecting dependencies, if any.
pub fn active_sub_id() -> Option<CellId> {
    ACTIVE_SUB.with(|slot| slot.borrow().as_ref().map(|sub| sub.subscriber))
}

/// Check whether reads are currently being tracked on this thread.
pub fn is_tracking() -> bool {
    ACTIVE_SUB.with(|slot| slot.borrow().is_some())
}

/// Record a read of `cell` at `version` against the active subscriber.
///
/// Returns the subscriber's ID so the cell can register it as a dependent,
/// or `None` when no subscriber is active.
pub(crate) fn record_read(cell: CellId, version: u64) -> Option<CellId> {
    ACTIVE_SUB.with(|slot| {
        slot.borrow_mut().as_mut().map(|sub| {
            sub.reads.entry(cell).or_insert(version);
            sub.subscriber
        })
    })
}

/// Scope guard for one dependency-collecting evaluation.
///
/// Swaps a fresh [`ActiveSub`] into the slot on entry. `finish` swaps the
/// previous occupant back and yields the collected reads; if the evaluation
/// unwinds instead, `Drop` still restores the previous occupant.
pub(crate) struct TrackingGuard {
    previous: Option<ActiveSub>,
    finished: bool,
}

impl TrackingGuard {
    pub(crate) fn enter(subscriber: CellId) -> Self {
        let previous = set_active_sub(Some(ActiveSub::new(subscriber)));
        Self {
            previous,
            finished: false,
        }
    }

    /// End the scope, restoring the previous subscriber and returning the
    /// recorded reads.
    pub(crate) fn finish(mut self) -> IndexMap<CellId, u64> {
        self.finished = true;
        let scope = set_active_sub(self.previous.take());
        scope.map(|sub| sub.reads).unwrap_or_default()
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if !self.finished {
            set_active_sub(self.previous.take());
        }
    }
}

/// Scope guard that suspends dependency collection.
///
/// Swaps `None` into the slot on entry and restores the saved occupant on
/// drop, so the suspension survives panics in the suspended section.
pub(crate) struct UntrackedGuard {
    previous: Option<ActiveSub>,
}

impl UntrackedGuard {
    pub(crate) fn enter() -> Self {
        Self {
            previous: set_active_sub(None),
        }
    }
}

impl Drop for UntrackedGuard {
    fn drop(&mut self) {
        set_active_sub(self.previous.take());
    }
}
