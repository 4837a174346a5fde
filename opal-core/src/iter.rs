//! Guarded iteration: the shared shape of every host-to-script loop.
//!
//! Chunked reads, producer-push appends, directory walks and the fold
//! family all follow the same pattern: invoke a user callable per
//! element/chunk, inspect its result for an abort or error signal, and stop
//! early while keeping the partial result. Centralizing the loop keeps that
//! contract uniform and testable on its own.

use crate::error::Result;

/// Verdict returned by one iteration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep iterating.
    Continue,
    /// Stop now; the state accumulated so far is the result.
    Break,
}

/// Drive `step` until it breaks or errors, returning the final state.
///
/// The step receives the zero-based iteration index and mutable access to
/// the accumulator. An error propagates immediately, abandoning the state.
pub fn drive<S, F>(mut state: S, mut step: F) -> Result<S>
where
    F: FnMut(u64, &mut S) -> Result<Flow>,
{
    let mut index = 0u64;
    loop {
        match step(index, &mut state)? {
            Flow::Continue => index += 1,
            Flow::Break => return Ok(state),
        }
    }
}
