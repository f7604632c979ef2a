//! The dependency-tracking engine.
//!
//! Three kinds of cell live in one dependency graph:
//!
//! - **Source cells** ([`RawSignal`]): mutable values. Writes bump a
//!   version counter and push a staleness wave downstream.
//! - **Derived cells** ([`RawComputed`]): cached getters over other cells.
//!   Lazy; a read recomputes only when a recorded dependency actually
//!   moved.
//! - **Effects** ([`Effect`]): eager callbacks. Writes queue them,
//!   deduplicated, and the queue drains when the outermost batch closes.
//!
//! # How Tracking Works
//!
//! Dependencies are discovered at run time. While a derived cell or effect
//! evaluates, it occupies a thread-local subscriber slot; every tracked
//! read records `(cell, version)` with the occupant and registers it as a
//! dependent of the cell being read. The slot is swapped, never pushed, so
//! suspending tracking (`peek`, `untracked`) is the same operation as
//! entering a scope: replace the occupant, restore it on the way out.
//!
//! # Push and Pull
//!
//! A write pushes only cheap `MaybeDirty` marks through the graph, then
//! stops. Values are pulled: the next read of a marked cell refreshes its
//! dependencies in read order and compares versions, recomputing just the
//! cells whose inputs observably changed. Equal-value writes and
//! recomputes keep their version, so stabilized branches of the graph stay
//! quiet.
//!
//! Cells are identified by [`CellId`] and registered in a process-wide
//! weak registry; [`cell_count`] reports how many are live.

mod batch;
mod computed;
pub(crate) mod context;
mod effect;
mod error;
mod node;
mod runtime;
mod signal;

pub use batch::{batch_depth, end_batch, start_batch};
pub use computed::RawComputed;
pub use context::{active_sub_id, is_tracking, set_active_sub, ActiveSub};
pub use effect::Effect;
pub use error::ReactiveError;
pub use node::{CellId, DirtyState};
pub use runtime::cell_count;
pub use signal::RawSignal;
