//! Signal handles.
//!
//! [`Signal<T>`] is the ergonomic face of a source cell: it owns a
//! [`RawSignal<T>`] and pairs the tracked read (`get`) with an
//! unsubscribed one (`peek`). The free [`signal`] constructor and the
//! [`is_signal`]/[`as_signal`] guards for narrowing a `&dyn Any` back to a
//! concrete handle live here too.

use std::any::Any;
use std::fmt::Debug;

use crate::reactive::context::UntrackedGuard;
use crate::reactive::{CellId, RawSignal};

/// Handle to a mutable source cell.
///
/// Clones share one backing cell, so a signal can be captured by any
/// number of derivations and effects. Reading with [`get`](Self::get)
/// subscribes the active computation; [`peek`](Self::peek) reads without
/// subscribing anything.
pub struct Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    raw: RawSignal<T>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a signal seeded with `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            raw: RawSignal::new(initial),
        }
    }

    /// Identity of the backing cell.
    pub fn id(&self) -> CellId {
        self.raw.id()
    }

    /// Read the current value, subscribing the active computation.
    pub fn get(&self) -> T {
        self.raw.read()
    }

    /// Read the current value without registering a dependency.
    ///
    /// The active subscriber is swapped out for the duration of the read
    /// and restored afterward, even if the read unwinds, so peeking from
    /// inside a derivation leaves that derivation's dependency set
    /// untouched.
    pub fn peek(&self) -> T {
        let _suspend = UntrackedGuard::enter();
        self.get()
    }

    /// Store a new value and notify subscribers.
    ///
    /// Writing a value equal to the current one is a no-op. Notification
    /// is deferred while a batch is open.
    pub fn set(&self, value: T) {
        self.raw.write(value);
    }

    /// Compute the next value from the current one and store it.
    ///
    /// The read is untracked: calling `update` inside a derivation does
    /// not subscribe that derivation to this signal.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.raw.read_untracked());
        self.raw.write(next);
    }

    /// Number of cells currently subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        self.raw.subscriber_count()
    }

    /// The backing primitive cell.
    pub fn as_raw(&self) -> &RawSignal<T> {
        &self.raw
    }
}

/// Create a mutable signal holding `initial`.
pub fn signal<T>(initial: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(initial)
}

/// Whether `value` is a [`Signal<T>`].
///
/// Never panics: raw cells, computed handles, and plain values all answer
/// `false`, as does a `Signal` over a different value type.
pub fn is_signal<T>(value: &dyn Any) -> bool
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    value.is::<Signal<T>>()
}

/// Narrow `value` to a [`Signal<T>`] if it is one.
pub fn as_signal<T>(value: &dyn Any) -> Option<&Signal<T>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    value.downcast_ref::<Signal<T>>()
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.raw.read_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Serde integration
// ----------------------------------------------------------------------------

// A signal serializes as its current value; the read is untracked, so
// serializing inside a derivation never subscribes it.
#[cfg(feature = "serde")]
impl<T> serde::Serialize for Signal<T>
where
    T: serde::Serialize + Clone + Send + Sync + PartialEq + 'static,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.raw.read_untracked().serialize(serializer)
    }
}

// A plain value deserializes into a fresh signal holding it.
#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Signal<T>
where
    T: serde::Deserialize<'de> + Clone + Send + Sync + PartialEq + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Signal::new)
    }
}
