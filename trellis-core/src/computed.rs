//! Computed handles.
//!
//! [`Computed<T>`] wraps a [`RawComputed<T>`]: a lazily evaluated, cached
//! derivation over other cells. Alongside the handle live the free
//! [`computed`] constructor and the [`is_computed`]/[`as_computed`] guards
//! for narrowing a `&dyn Any`.

use std::any::Any;
use std::fmt::Debug;

use crate::reactive::context::UntrackedGuard;
use crate::reactive::{CellId, RawComputed, ReactiveError};

/// Handle to a derived cell.
///
/// The getter receives the previously cached value (`None` on the first
/// evaluation) and re-runs only when a dependency observably changed.
/// Reading with [`get`](Self::get) subscribes the active computation;
/// [`peek`](Self::peek) reads without subscribing anything. Clones share
/// one backing cell.
pub struct Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    raw: RawComputed<T>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a derived cell over `getter`. Nothing runs until the first
    /// read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(Option<&T>) -> T + Send + Sync + 'static,
    {
        Self {
            raw: RawComputed::new(getter),
        }
    }

    /// Identity of the backing cell.
    pub fn id(&self) -> CellId {
        self.raw.id()
    }

    /// Read the current value, recomputing if stale and subscribing the
    /// active computation. Panics if the evaluation reaches a cycle.
    pub fn get(&self) -> T {
        self.raw.read()
    }

    /// Fallible form of [`get`](Self::get): a cyclic evaluation comes back
    /// as [`ReactiveError::Cycle`] instead of a panic.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.raw.try_read()
    }

    /// Read the current value without registering a dependency.
    ///
    /// Staleness is still resolved, so the value is current; only the
    /// subscription is suppressed. The active subscriber is swapped out
    /// around the read and restored even if the read unwinds.
    pub fn peek(&self) -> T {
        let _suspend = UntrackedGuard::enter();
        self.get()
    }

    /// The backing primitive cell.
    pub fn as_raw(&self) -> &RawComputed<T> {
        &self.raw
    }
}

/// Create a derived cell over `getter`.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn(Option<&T>) -> T + Send + Sync + 'static,
{
    Computed::new(getter)
}

/// Whether `value` is a [`Computed<T>`].
///
/// Never panics: raw cells, signal handles, and plain values all answer
/// `false`, as does a `Computed` over a different value type.
pub fn is_computed<T>(value: &dyn Any) -> bool
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    value.is::<Computed<T>>()
}

/// Narrow `value` to a [`Computed<T>`] if it is one.
pub fn as_computed<T>(value: &dyn Any) -> Option<&Computed<T>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    value.downcast_ref::<Computed<T>>()
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("state", &self.raw.dirty_state())
            .field("has_value", &self.raw.has_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Serde integration
// ----------------------------------------------------------------------------

// A computed cell serializes as its current value, resolving staleness
// first; the read is untracked, so serializing never subscribes. There is
// no `Deserialize`: a derivation cannot be reconstructed from a value.
#[cfg(feature = "serde")]
impl<T> serde::Serialize for Computed<T>
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
