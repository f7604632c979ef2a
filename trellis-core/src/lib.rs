//! Trellis Core
//!
//! Fine-grained reactive state: plain values behind handles that know who
//! reads them.
//!
//! - [`Signal<T>`]: mutable source cell with `get`/`peek`/`set`/`update`
//! - [`Computed<T>`]: lazily recomputed, cached derivation over other cells
//! - [`Effect`]: eager callback re-run when its dependencies change
//! - [`batch`] / [`untracked`]: write coalescing and tracking suspension
//! - [`is_signal`] / [`is_computed`]: guards for narrowing a `&dyn Any`
//!
//! Dependencies are discovered at run time: whatever a derivation actually
//! reads this evaluation is what it subscribes to. Writes push cheap
//! staleness marks; values are pulled on read, and only cells whose inputs
//! observably changed recompute. Equal-value writes are no-ops.
//!
//! # Architecture
//!
//! - [`reactive`]: the dependency-tracking engine (cells, registry,
//!   batching, the subscriber slot)
//! - `signal` / `computed`: handle types over the engine's primitive cells
//! - `scope`: the `batch` and `untracked` helpers
//!
//! The full primitive surface is re-exported from the crate root, so code
//! that needs to drop below the handles (raw cells, subscriber-slot
//! control, batch depth) can do so without extra imports.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{batch, computed, signal, Effect};
//!
//! let count = signal(0);
//! let doubled = {
//!     let count = count.clone();
//!     computed(move |_| count.get() * 2)
//! };
//! assert_eq!(doubled.get(), 0);
//!
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//!
//! let logger = {
//!     let doubled = doubled.clone();
//!     Effect::new(move || println!("doubled is now {}", doubled.get()))
//! };
//!
//! // Two writes, one notification: the effect runs once, printing 14.
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//!
//! logger.dispose();
//! ```

pub mod reactive;

mod computed;
mod scope;
mod signal;

pub use computed::{as_computed, computed, is_computed, Computed};
pub use scope::{batch, untracked};
pub use signal::{as_signal, is_signal, signal, Signal};

pub use reactive::{
    active_sub_id, batch_depth, cell_count, end_batch, is_tracking, set_active_sub,
    start_batch, ActiveSub, CellId, DirtyState, Effect, RawComputed, RawSignal,
    ReactiveError,
};
