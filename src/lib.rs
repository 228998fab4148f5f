//! # rallocator - An Explicit Free List Dynamic Storage Allocator
//!
//! This crate provides a boundary-tagged, explicit free list allocator -
//! the kind of allocator a real `malloc`/`free`/`realloc` implementation
//! would use - over a simulated heap, plus a trace-driven harness that
//! validates correctness, measures memory utilization, and benchmarks
//! throughput against recorded allocation traces.
//!
//! ## Overview
//!
//! Every block on the heap carries a header and footer (a "boundary tag")
//! recording its size and allocated state:
//!
//! ```text
//!   Allocated block:                  Free block:
//!
//!   ┌──────────────┐                  ┌──────────────┐
//!   │ header: size|a│                 │ header: size|a│
//!   ├──────────────┤                  ├──────────────┤
//!   │              │                  │ flink        │
//!   │   payload    │                  ├──────────────┤
//!   │              │                  │ blink        │
//!   ├──────────────┤                  ├──────────────┤
//!   │ footer: size|a│                 │ footer: size|a│
//!   └──────────────┘                  └──────────────┘
//! ```
//!
//! Free blocks are threaded onto a circular, doubly linked free list
//! (`flink`/`blink` stored directly in the block's own payload, since a
//! free block has no payload of its own to protect). `malloc` does a
//! first-fit scan of that list; `free` does immediate, bounded coalescing
//! with whichever physical neighbors are free.
//!
//! ## Crate Structure
//!
//! ```text
//!   rallocator
//!   ├── align      - word-size alignment helpers
//!   ├── error      - HeapError / InitError
//!   ├── heap       - the simulated, grow-only sbrk-like byte region
//!   ├── block      - boundary-tag and free-list-link accessors over BlockOffset
//!   ├── freelist   - circular doubly linked free list splice operations
//!   ├── allocator  - Allocator: init, malloc, free, realloc, coalesce
//!   └── harness    - trace parsing, replay, utilization/speed scoring, REPL
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use rallocator::allocator::Allocator;
//!
//! let mut a = Allocator::new();
//! a.init().unwrap();
//!
//! let p = a.malloc(24).unwrap();
//! a.payload_mut(p, 24).copy_from_slice(&[7u8; 24]);
//! let p = a.realloc(Some(p), 64).unwrap();
//! assert_eq!(a.payload(p, 24), [7u8; 24]);
//! a.free(Some(p));
//! ```
//!
//! ## Block identity: offsets, not pointers
//!
//! Blocks are identified by [`block::BlockOffset`], a byte offset from the
//! heap's base, rather than a raw pointer into the simulated heap's
//! backing buffer. Offsets stay valid and comparable without the aliasing
//! and provenance questions a `*mut u8` into a `Vec<u8>` would raise, at
//! the cost of an extra indirection (`heap.read_word(offset)`) wherever a
//! real allocator would just dereference.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives.
//! - **Simulated heap**: backed by an in-process buffer capped at
//!   [`heap::MAX_HEAP`], not a real `sbrk`/`mmap`-backed segment.
//! - **First-fit, not best-fit or segregated-fit**: see `allocator`'s
//!   module docs for the tradeoffs this implies for utilization.

pub mod align;
pub mod allocator;
pub mod block;
pub mod error;
pub mod freelist;
pub mod harness;
pub mod heap;
