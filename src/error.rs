//! Error types for the heap provider and allocator.
//!
//! `malloc`/`realloc` report out-of-memory by returning `None` rather than
//! an `Err` (mirroring `sbrk`'s `(void*)-1` convention - out of memory is
//! not a caller error), but the heap provider's `grow` and the allocator's
//! `init` have a real failure mode worth naming.

use thiserror::Error;

/// Failure growing the simulated heap.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// Growing by the requested number of bytes would exceed `MAX_HEAP`.
  #[error("heap growth of {requested} bytes would exceed the {max}-byte cap (currently {current})")]
  OutOfMemory {
    requested: usize,
    current: usize,
    max: usize,
  },
}

/// Failure initializing the allocator (installing prologue/epilogue).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
  #[error("failed to grow the heap for the prologue/epilogue sentinels: {0}")]
  Heap(#[from] HeapError),
}
