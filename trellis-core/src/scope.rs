//! Batched writes and untracked reads.
//!
//! [`batch`] coalesces notification: writes inside the callback mark the
//! graph as usual, but affected effects run once, after the outermost
//! batch closes, instead of once per write. [`untracked`] suspends
//! dependency tracking: reads inside the callback register nothing with
//! the active subscriber.
//!
//! Both close their scope through a drop guard, so a callback that
//! unwinds leaves the engine consistent: the batch depth returns to where
//! it was (flushing whatever was queued), and the suspended subscriber is
//! restored.

use crate::reactive::context::UntrackedGuard;
use crate::reactive::{end_batch, start_batch};

/// Closes the batch opened by [`batch`] even if the callback unwinds.
struct BatchScope;

impl Drop for BatchScope {
    fn drop(&mut self) {
        end_batch();
    }
}

/// Run `f` with effect notification deferred.
///
/// Writes inside `f` propagate staleness immediately (reads inside the
/// batch see fresh values) but queue affected effects instead of running
/// them. When the outermost batch closes, each queued effect runs at most
/// once, regardless of how many writes touched its dependencies. Batches
/// nest; only the outermost close flushes.
///
/// Returns whatever `f` returns.
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    start_batch();
    let _scope = BatchScope;
    f()
}

/// Run `f` with dependency tracking suspended.
///
/// The active subscriber is swapped out for the duration of `f` and
/// restored afterward, so reads inside the callback register nothing.
/// Nesting is fine: each level restores the exact occupant it displaced,
/// which for the outermost level is the enclosing derivation.
///
/// Returns whatever `f` returns.
pub fn untracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _suspend = UntrackedGuard::enter();
    f()
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::reactive::{batch_depth, is_tracking, Effect};
    use crate::signal::signal;

    #[test]
    fn batch_returns_the_callback_value_and_nests() {
        let value = batch(|| {
            assert_eq!(batch_depth(), 1);
            batch(|| assert_eq!(batch_depth(), 2));
            assert_eq!(batch_depth(), 1);
            "done"
        });

        assert_eq!(value, "done");
        assert_eq!(batch_depth(), 0);
    }

    #[test]
    fn batch_defers_effects_until_close() {
        let cell = signal(0);
        let runs = Arc::new(AtomicI32::new(0));

        let (c, n) = (cell.clone(), runs.clone());
        let _effect = Effect::new(move || {
            c.get();
            n.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            cell.set(1);
            cell.set(2);
            cell.set(3);
            assert_eq!(runs.load(Ordering::SeqCst), 1, "deferred inside the batch");
        });

        assert_eq!(runs.load(Ordering::SeqCst), 2, "one run per batch");
    }

    #[test]
    fn batch_closes_on_unwind() {
        let cell = signal(0);
        let runs = Arc::new(AtomicI32::new(0));

        let (c, n) = (cell.clone(), runs.clone());
        let _effect = Effect::new(move || {
            c.get();
            n.fetch_add(1, Ordering::SeqCst);
        });

        let result = catch_unwind(AssertUnwindSafe(|| {
            batch(|| {
                cell.set(1);
                panic!("boom");
            })
        }));

        assert!(result.is_err());
        assert_eq!(batch_depth(), 0, "unwind closed the scope");
        assert_eq!(runs.load(Ordering::SeqCst), 2, "queued work still flushed");

        cell.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 3, "later writes notify immediately");
    }

    #[test]
    fn untracked_returns_the_callback_value() {
        let cell = signal(5);
        assert_eq!(untracked(|| cell.get()), 5);
    }

    #[test]
    fn untracked_suspends_tracking() {
        let observed = Arc::new(AtomicI32::new(-1));
        let o = observed.clone();
        let cell = crate::computed::computed(move |_| {
            assert!(is_tracking());
            untracked(|| {
                o.store(is_tracking() as i32, Ordering::SeqCst);
            });
            assert!(is_tracking(), "subscriber restored after the scope");
            0
        });

        cell.get();
        assert_eq!(observed.load(Ordering::SeqCst), 0, "no tracking inside");
    }
}
