//! Stack growth for the recursive tree transforms and walkers
//!
//! Nesting depth is bounded by `AnalyzerOptions::max_stack_depth`, but the
//! frames of a debug build are large enough that the thread stack runs out
//! first. Recursive entry points go through [`maybe_grow`], which switches to
//! a heap-allocated segment when the remaining stack drops below the red
//! zone.

/// Remaining stack below which a new segment is allocated
const STACK_RED_ZONE: usize = 256 << 10;

/// Size of each new segment
const STACK_SIZE: usize = 4 << 20;

pub(crate) fn maybe_grow<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SIZE, f)
}
