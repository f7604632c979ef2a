//! Cell registry and change propagation.
//!
//! The runtime owns the one piece of global state in the engine: a registry
//! mapping every live cell to a weak handle on its graph-facing surface.
//! Writes walk dependent edges through the registry to mark derived cells
//! stale and queue effects; derived reads walk their recorded edges back
//! through it to decide whether a recompute is actually needed.
//!
//! The registry holds `Weak` references, so it never extends a cell's
//! lifetime: dropping the last handle tears the cell down, and resolution
//! prunes entries whose node is already gone.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use super::batch;
use super::error::ReactiveError;
use super::node::{CellId, ReactiveNode};

static REGISTRY: OnceLock<DashMap<CellId, Weak<dyn ReactiveNode>>> = OnceLock::new();

fn registry() -> &'static DashMap<CellId, Weak<dyn ReactiveNode>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Number of cells currently registered.
pub fn cell_count() -> usize {
    registry().len()
}

/// Make `node` reachable by id for propagation and edge validation.
pub(crate) fn register(id: CellId, node: Weak<dyn ReactiveNode>) {
    registry().insert(id, node);
}

/// Remove a cell's registry entry. Safe to call for an id that is already
/// gone.
pub(crate) fn deregister(id: CellId) {
    registry().remove(&id);
}

/// Upgrade `id` to a live node, pruning the entry if the node dropped.
pub(crate) fn resolve(id: CellId) -> Option<Arc<dyn ReactiveNode>> {
    let weak = registry().get(&id).map(|entry| entry.value().clone())?;
    match weak.upgrade() {
        Some(node) => Some(node),
        None => {
            registry().remove(&id);
            None
        }
    }
}

/// Mark everything downstream of `from` as possibly stale.
///
/// Breadth-first walk over dependent edges: lazy cells are marked
/// `MaybeDirty` and their own dependents visited, already-stale cells end
/// the walk early (their downstream was marked when they went stale), and
/// eager cells are queued for the next flush instead of being marked. The
/// queue drains once no batch is open.
pub(crate) fn propagate(from: CellId) {
    let origin = match resolve(from) {
        Some(node) => node,
        None => return,
    };

    let mut queue: VecDeque<CellId> = origin.dependents().into_iter().collect();
    let mut marked = 0usize;

    while let Some(id) = queue.pop_front() {
        let node = match resolve(id) {
            Some(node) => node,
            None => continue,
        };
        if node.is_eager() {
            batch::schedule_effect(id);
            continue;
        }
        if node.mark_maybe_dirty() {
            marked += 1;
            queue.extend(node.dependents());
        }
    }

    tracing::trace!(
        "cell {} propagated: {marked} dependent(s) marked stale",
        from.raw()
    );
}

/// Check whether any recorded dependency observably moved.
///
/// Walks `edges` in read order. Each dependency is refreshed first, so a
/// `MaybeDirty` chain resolves root-first; the first version that differs
/// from the recorded one answers `true` without touching later edges. A
/// dependency that no longer exists counts as moved.
pub(crate) fn dependencies_changed(edges: &[(CellId, u64)]) -> Result<bool, ReactiveError> {
    for &(id, seen) in edges {
        let node = match resolve(id) {
            Some(node) => node,
            None => return Ok(true),
        };
        node.refresh()?;
        if node.version() != seen {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Remove `subscriber` from the dependent sets of every cell in `edges`.
///
/// Called before a recompute collects fresh edges and when a subscriber is
/// torn down, so cells never mark a dependent that stopped reading them.
pub(crate) fn detach(subscriber: CellId, edges: &[(CellId, u64)]) {
    for &(id, _) in edges {
        if let Some(node) = resolve(id) {
            node.remove_dependent(subscriber);
        }
    }
}
