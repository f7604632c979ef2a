//! End-to-end scenarios across signals, computeds, effects, batching, and
//! tracking suspension, driven through the public API only.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use trellis_core::{
    active_sub_id, as_computed, as_signal, batch, batch_depth, cell_count, computed,
    is_computed, is_signal, set_active_sub, signal, untracked, CellId, Computed, Effect,
    RawSignal, ReactiveError, Signal,
};

fn counter() -> Arc<AtomicI32> {
    Arc::new(AtomicI32::new(0))
}

/// A signal reads back what was written, latest write winning.
#[test]
fn signal_reads_latest_write() {
    let name = signal(String::from("a"));
    assert_eq!(name.get(), "a");

    name.set(String::from("b"));
    name.set(String::from("c"));
    assert_eq!(name.get(), "c");
}

/// The canonical pipeline: a count, a derivation over it, reads stay
/// consistent across writes.
#[test]
fn count_and_doubled_end_to_end() {
    let count = signal(0);
    let c = count.clone();
    let doubled = computed(move |_| c.get() * 2);

    assert_eq!(doubled.get(), 0);
    count.set(5);
    assert_eq!(doubled.get(), 10);
}

/// `peek` from inside a derivation must not subscribe it: later writes to
/// the peeked cell leave the derivation untouched.
#[test]
fn peek_does_not_register_a_dependency() {
    let upstream = signal(1);
    let recomputes = counter();

    let (u, n) = (upstream.clone(), recomputes.clone());
    let derived = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        u.peek() * 10
    });

    assert_eq!(derived.get(), 10);
    assert_eq!(upstream.subscriber_count(), 0);

    upstream.set(2);
    assert_eq!(derived.get(), 10, "peek-only derivation must not recompute");
    assert_eq!(recomputes.load(Ordering::SeqCst), 1);
}

/// `get` from inside a derivation does subscribe it.
#[test]
fn get_registers_a_dependency() {
    let upstream = signal(1);
    let u = upstream.clone();
    let doubled = computed(move |_| u.get() * 2);

    assert_eq!(doubled.get(), 2);
    assert_eq!(upstream.subscriber_count(), 1);

    upstream.set(4);
    assert_eq!(doubled.get(), 8);
}

/// The guards discriminate wrapper kind and value type, and reject raw
/// cells and plain values.
#[test]
fn type_guards_discriminate_wrapper_kinds() {
    let s = signal(1);
    let c = computed(|_| 1);

    assert!(is_signal::<i32>(&s));
    assert!(!is_signal::<i32>(&c));
    assert!(is_computed::<i32>(&c));
    assert!(!is_computed::<i32>(&s));

    // Value-type mismatches do not match either.
    assert!(!is_signal::<u32>(&s));
    assert!(!is_computed::<u32>(&c));

    // Raw (unwrapped) cells and unrelated values are rejected.
    assert!(!is_signal::<i32>(&RawSignal::new(1)));
    assert!(!is_signal::<i32>(&()));
    assert!(!is_signal::<i32>(&42));
    assert!(!is_computed::<i32>(&"x"));
    assert!(!is_computed::<i32>(&None::<i32>));

    assert_eq!(as_signal::<i32>(&s).map(Signal::get), Some(1));
    assert_eq!(as_computed::<i32>(&c).map(Computed::get), Some(1));
    assert!(as_signal::<i32>(&c as &dyn std::any::Any).is_none());
}

/// Several writes inside one batch produce exactly one recompute and one
/// effect run, observed only after the batch returns.
#[test]
fn batch_coalesces_writes_into_one_wave() {
    let a = signal(1);
    let b = signal(10);
    let recomputes = counter();

    let (a2, b2, n) = (a.clone(), b.clone(), recomputes.clone());
    let sum = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        a2.get() + b2.get()
    });

    let runs = counter();
    let (s2, r) = (sum.clone(), runs.clone());
    let _watch = Effect::new(move || {
        s2.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(recomputes.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        a.set(2);
        b.set(20);
        assert_eq!(runs.load(Ordering::SeqCst), 1, "deferred mid-batch");
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2, "one run per batch");
    assert_eq!(recomputes.load(Ordering::SeqCst), 2, "one recompute per batch");
    assert_eq!(sum.get(), 22);
}

/// Derived reads are never deferred: inside a batch they pull fresh
/// values; only effect notification waits for the close.
#[test]
fn reads_inside_a_batch_see_fresh_values() {
    let base = signal(1);
    let b = base.clone();
    let doubled = computed(move |_| b.get() * 2);

    assert_eq!(doubled.get(), 2);
    batch(|| {
        base.set(5);
        assert_eq!(doubled.get(), 10);
    });
}

/// A read wrapped in `untracked` is invisible to the enclosing derivation.
#[test]
fn untracked_read_leaves_the_dependency_set_unchanged() {
    let tracked = signal(1);
    let side = signal(100);
    let recomputes = counter();

    let (t, s, n) = (tracked.clone(), side.clone(), recomputes.clone());
    let derived = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        t.get() + untracked(|| s.get())
    });

    assert_eq!(derived.get(), 101);
    assert_eq!(side.subscriber_count(), 0);

    side.set(200);
    assert_eq!(derived.get(), 101, "untracked read is not a dependency");
    assert_eq!(recomputes.load(Ordering::SeqCst), 1);

    tracked.set(2);
    assert_eq!(derived.get(), 202, "tracked dependency still live");
}

/// Nested suspensions restore the exact previous occupant at each level.
/// The outermost level sits inside a derivation, so its restore must bring
/// the derivation back rather than leave the slot empty.
#[test]
fn nested_untracked_restores_each_level() {
    let observed: Arc<Mutex<Vec<(&'static str, Option<CellId>)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let log = observed.clone();
    let derived = computed(move |_| {
        let push = |label| log.lock().unwrap().push((label, active_sub_id()));
        push("enter");
        untracked(|| {
            push("level1");
            untracked(|| {
                push("level2");
                untracked(|| push("level3"));
                push("after3");
            });
            push("after2");
        });
        push("after1");
        0
    });

    derived.get();

    let log = observed.lock().unwrap();
    let entry = |label: &str| {
        log.iter()
            .find(|(l, _)| *l == label)
            .map(|(_, id)| *id)
            .unwrap()
    };

    let entered = entry("enter");
    assert!(entered.is_some(), "getter runs under its own subscriber");
    for label in ["level1", "level2", "level3", "after3", "after2"] {
        assert_eq!(entry(label), None, "{label} should be suspended");
    }
    assert_eq!(entry("after1"), entered, "outermost restore brings the derivation back");
}

/// The manual swap protocol reads just like `peek`: take the occupant out,
/// read, put it back.
#[test]
fn manual_subscriber_swap_suppresses_the_subscription() {
    let upstream = signal(1);
    let u = upstream.clone();
    let derived = computed(move |_| {
        let saved = set_active_sub(None);
        let value = u.get();
        set_active_sub(saved);
        value
    });

    assert_eq!(derived.get(), 1);
    assert_eq!(upstream.subscriber_count(), 0);
}

/// One write into a diamond recomputes each arm and the join exactly once.
#[test]
fn diamond_recomputes_each_cell_once_per_write() {
    let base = signal(1);
    let (left_n, right_n, join_n) = (counter(), counter(), counter());

    let (b, n) = (base.clone(), left_n.clone());
    let left = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        b.get() * 2
    });
    let (b, n) = (base.clone(), right_n.clone());
    let right = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        b.get() + 1
    });

    let (l, r, n) = (left.clone(), right.clone(), join_n.clone());
    let join = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        l.get() + r.get()
    });

    assert_eq!(join.get(), 4);
    for n in [&left_n, &right_n, &join_n] {
        assert_eq!(n.load(Ordering::SeqCst), 1);
    }

    base.set(3);
    assert_eq!(join.get(), 10);
    for n in [&left_n, &right_n, &join_n] {
        assert_eq!(n.load(Ordering::SeqCst), 2);
    }
}

/// The getter sees its previously cached value: `None` first, then the
/// last committed result.
#[test]
fn getter_receives_the_previous_value() {
    let seen: Arc<Mutex<Vec<Option<i32>>>> = Arc::new(Mutex::new(Vec::new()));
    let base = signal(1);

    let (b, log) = (base.clone(), seen.clone());
    let derived = computed(move |previous| {
        log.lock().unwrap().push(previous.copied());
        b.get() * 2
    });

    assert_eq!(derived.get(), 2);
    base.set(3);
    assert_eq!(derived.get(), 6);

    assert_eq!(*seen.lock().unwrap(), vec![None, Some(2)]);
}

/// A getter that reaches its own cell sees `ReactiveError::Cycle` through
/// `try_get` and can recover.
#[test]
fn self_reference_reports_a_cycle_through_try_get() {
    let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());

    let inner = slot.clone();
    let derived = computed(move |_| {
        let handle = inner.get().expect("cell stored before first read");
        match handle.try_get() {
            Ok(value) => value + 1,
            Err(ReactiveError::Cycle(_)) => -1,
        }
    });
    slot.set(derived.clone()).unwrap();

    assert_eq!(derived.get(), -1);
    assert_eq!(derived.try_get(), Ok(-1), "recovered value is cached");
}

/// The panicking read surfaces the same cycle as a panic.
#[test]
#[should_panic(expected = "dependency cycle")]
fn self_reference_panics_through_get() {
    let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());

    let inner = slot.clone();
    let derived = computed(move |_| inner.get().expect("stored").get() + 1);
    slot.set(derived.clone()).unwrap();

    derived.get();
}

/// Disposed effects never run again, no matter what their dependencies do.
#[test]
fn disposed_effects_never_run_again() {
    let base = signal(0);
    let runs = counter();

    let (b, n) = (base.clone(), runs.clone());
    let watch = Effect::new(move || {
        b.get();
        n.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    watch.dispose();

    base.set(1);
    batch(|| base.set(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Writing the value a cell already holds notifies nobody.
#[test]
fn equal_writes_do_not_notify() {
    let base = signal(7);
    let runs = counter();

    let (b, n) = (base.clone(), runs.clone());
    let _watch = Effect::new(move || {
        b.get();
        n.fetch_add(1, Ordering::SeqCst);
    });

    base.set(7);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(base.get(), 7);

    base.set(8);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// When an upstream recompute produces an equal value, queued effects are
/// skipped: stabilized branches stay quiet.
#[test]
fn stabilized_recompute_does_not_cascade() {
    let base = signal(2);
    let parity_n = counter();
    let runs = counter();

    let (b, n) = (base.clone(), parity_n.clone());
    let parity = computed(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        b.get() % 2
    });

    let (p, r) = (parity.clone(), runs.clone());
    let _watch = Effect::new(move || {
        p.get();
        r.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(parity_n.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // 2 -> 4: parity recomputes to the same value; the effect is skipped.
    base.set(4);
    assert_eq!(parity_n.load(Ordering::SeqCst), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // 4 -> 5: parity changes; the effect runs.
    base.set(5);
    assert_eq!(parity_n.load(Ordering::SeqCst), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// An effect writing a signal inside its run feeds the next wave: both
/// effects settle before the outer write returns.
#[test]
fn effect_writes_cascade_in_waves() {
    let input = signal(0);
    let relay = signal(0);

    let (i, r) = (input.clone(), relay.clone());
    let _scale = Effect::new(move || {
        let value = i.get();
        r.set(value * 10);
    });

    let seen = Arc::new(AtomicI32::new(-1));
    let (r2, s) = (relay.clone(), seen.clone());
    let _sink = Effect::new(move || {
        s.store(r2.get(), Ordering::SeqCst);
    });

    assert_eq!(seen.load(Ordering::SeqCst), 0);

    input.set(4);
    assert_eq!(relay.get(), 40);
    assert_eq!(seen.load(Ordering::SeqCst), 40);
}

/// A panic inside the batch callback closes the scope: depth returns to
/// zero, queued effects still flush, later writes notify immediately.
#[test]
fn batch_unwind_leaves_the_engine_consistent() {
    let base = signal(0);
    let runs = counter();

    let (b, n) = (base.clone(), runs.clone());
    let _watch = Effect::new(move || {
        b.get();
        n.fetch_add(1, Ordering::SeqCst);
    });

    let result = catch_unwind(AssertUnwindSafe(|| {
        batch(|| {
            base.set(1);
            panic!("boom");
        })
    }));

    assert!(result.is_err());
    assert_eq!(batch_depth(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 2, "queued run still flushed");

    base.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// A panic inside `untracked` restores the suspended subscriber.
#[test]
fn untracked_unwind_restores_the_subscriber() {
    let derived = computed(move |_| {
        let before = active_sub_id();
        let result = catch_unwind(AssertUnwindSafe(|| untracked(|| panic!("boom"))));
        assert!(result.is_err());
        assert_eq!(active_sub_id(), before, "occupant restored after unwind");
        0
    });

    assert_eq!(derived.get(), 0);
}

/// Live handles keep their cells registered.
#[test]
fn live_cells_are_registered() {
    let a = signal(1);
    let b = signal(2);
    assert!(cell_count() >= 2);
    drop((a, b));
}
