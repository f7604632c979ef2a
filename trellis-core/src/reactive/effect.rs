//! Effects.
//!
//! An `Effect` is the engine's eager subscriber: a callback that runs once
//! at construction to collect its dependencies and re-runs whenever one of
//! them observably changes. Writes queue affected effects (deduplicated)
//! instead of running them inline; the queue drains when the outermost
//! batch closes, or immediately for writes outside any batch.
//!
//! Before re-running, an effect re-validates its recorded edges the way a
//! derived read does. A queued effect whose dependencies all stabilized,
//! because an upstream recompute produced an equal value, is skipped.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context::TrackingGuard;
use super::error::ReactiveError;
use super::node::{CellId, ReactiveNode};
use super::runtime;

/// An eager computation re-run when its dependencies change.
///
/// Handles are cheap clones sharing one backing cell. The effect stops for
/// good when [`dispose`](Self::dispose) is called or the last handle drops.
pub struct Effect {
    inner: Arc<EffectState>,
}

struct EffectState {
    /// Identity of this cell in the dependency graph.
    id: CellId,

    /// Side-effecting callback; never run while the engine holds a lock.
    callback: Box<dyn Fn() + Send + Sync>,

    /// Dependency edges recorded during the last run, in read order.
    edges: RwLock<SmallVec<[(CellId, u64); 8]>>,

    /// Once set, the effect never runs again.
    disposed: AtomicBool,

    /// Number of completed callback runs.
    runs: AtomicU64,
}

impl Effect {
    /// Create an effect and run it immediately to collect dependencies.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectState {
            id: CellId::new(),
            callback: Box::new(callback),
            edges: RwLock::new(SmallVec::new()),
            disposed: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        });
        runtime::register(inner.id, Arc::downgrade(&inner) as Weak<dyn ReactiveNode>);
        inner.execute();
        Self { inner }
    }

    /// Identity of the backing cell.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Permanently stop the effect and detach it from the graph.
    pub fn dispose(&self) {
        self.inner.teardown();
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::SeqCst)
    }

    /// Number of cells the last run subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.edges.read().len()
    }
}

impl EffectState {
    /// Run the callback under a fresh tracking scope and commit the edges
    /// it read.
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let old_edges = std::mem::take(&mut *self.edges.write());
        runtime::detach(self.id, &old_edges);

        let scope = TrackingGuard::enter(self.id);
        (self.callback)();
        let reads = scope.finish();

        *self.edges.write() = reads.into_iter().collect();
        self.runs.fetch_add(1, Ordering::SeqCst);

        tracing::trace!("effect cell {} ran", self.id.raw());
    }

    /// Idempotent shutdown shared by `dispose` and the final drop.
    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        runtime::deregister(self.id);
        let edges = std::mem::take(&mut *self.edges.write());
        runtime::detach(self.id, &edges);
    }
}

impl ReactiveNode for EffectState {
    fn id(&self) -> CellId {
        self.id
    }

    fn version(&self) -> u64 {
        // Effects produce no value; nothing compares their version.
        0
    }

    fn refresh(&self) -> Result<(), ReactiveError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let edges = self.edges.read().clone();
        if !runtime::dependencies_changed(&edges)? {
            tracing::trace!(
                "effect cell {} skipped: dependencies stabilized",
                self.id.raw()
            );
            return Ok(());
        }

        self.execute();
        Ok(())
    }

    fn mark_maybe_dirty(&self) -> bool {
        // Effects are queued for the next flush, never marked.
        false
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn dependents(&self) -> SmallVec<[CellId; 8]> {
        SmallVec::new()
    }

    fn remove_dependent(&self, _id: CellId) {}
}

impl Drop for EffectState {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
