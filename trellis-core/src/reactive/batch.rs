//! Write batching and the pending-effect queue.
//!
//! Each thread keeps a batch depth counter and a queue of effects waiting
//! to run. Value-changing writes queue affected effects instead of running
//! them inline; the queue drains once the depth unwinds to zero (which is
//! immediately, for writes outside any batch). Nested batches only flush at
//! the outermost close, so a batch coalesces any number of writes into one
//! notification wave.

use std::cell::{Cell, RefCell};

use indexmap::IndexSet;

use super::node::CellId;
use super::runtime;

thread_local! {
    static BATCH_DEPTH: Cell<u32> = Cell::new(0);
    static PENDING: RefCell<IndexSet<CellId>> = RefCell::new(IndexSet::new());
    static FLUSHING: Cell<bool> = Cell::new(false);
}

/// Open a batch scope on this thread.
///
/// While at least one batch is open, writes mark and queue dependents but
/// do not run effects. Every `start_batch` must be paired with an
/// [`end_batch`]; the `batch` helper does this with unwind protection.
pub fn start_batch() {
    BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
}

/// Close the innermost batch scope, flushing queued effects if this was
/// the outermost one.
pub fn end_batch() {
    BATCH_DEPTH.with(|depth| {
        let current = depth.get();
        debug_assert!(current > 0, "end_batch without a matching start_batch");
        depth.set(current.saturating_sub(1));
    });
    flush_if_idle();
}

/// Current batch nesting depth on this thread. Zero means writes notify
/// immediately.
pub fn batch_depth() -> u32 {
    BATCH_DEPTH.with(|depth| depth.get())
}

/// Queue an effect to run at the next flush. Duplicates are collapsed;
/// queue order is discovery order.
pub(crate) fn schedule_effect(id: CellId) {
    PENDING.with(|pending| {
        pending.borrow_mut().insert(id);
    });
}

/// Run queued effects if no batch is open.
///
/// Effects run in waves: writes performed by a running effect queue into
/// the next wave rather than recursing. A flush already in progress higher
/// up the stack owns the loop, so nested calls return immediately.
pub(crate) fn flush_if_idle() {
    if batch_depth() > 0 {
        return;
    }
    if FLUSHING.with(|flushing| flushing.replace(true)) {
        return;
    }
    let _reset = FlushReset;

    loop {
        let wave = PENDING.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
        if wave.is_empty() {
            break;
        }
        tracing::trace!("flushing {} queued effect(s)", wave.len());
        for id in wave {
            if let Some(node) = runtime::resolve(id) {
                if let Err(err) = node.refresh() {
                    tracing::error!("effect {} skipped: {err}", id.raw());
                }
            }
        }
    }
}

/// Clears the flush-in-progress flag even if an effect panics.
struct FlushReset;

impl Drop for FlushReset {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}
