//! Error types for the reactive engine.

use super::node::CellId;

/// Errors surfaced by the fallible read paths.
///
/// The infallible accessors (`RawComputed::read`, `Computed::get`) panic
/// with the rendered message instead of returning these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A derived cell was re-entered while it was still being evaluated
    /// on the same thread, which means its value depends on itself.
    #[error("dependency cycle detected while evaluating cell {}", .0.raw())]
    Cycle(CellId),
}
