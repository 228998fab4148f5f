//! Boundary-tagged block primitives.
//!
//! Every block is identified by a [`BlockOffset`] - its byte offset from the
//! heap's base - rather than a raw pointer, which keeps block identity
//! stable independent of the backing buffer's address. The on-heap layout
//! these functions read and write:
//!
//! ```text
//!   word 0          : header = size | allocated_bit
//!   word 1..N-2     : payload (allocated) or [flink, blink, ...] (free)
//!   word N-1        : footer, a byte-for-byte copy of the header
//! ```
//!
//! `size` is always a multiple of [`WORD_SIZE`]; its least-significant bit,
//! which would otherwise always be zero, is overloaded as the allocated
//! flag. All size reads mask that bit off; all size writes OR the current
//! allocated bit back in so a lone `set_size` call can't accidentally free
//! or allocate a block.

use crate::align::WORD_SIZE;
use crate::heap::Heap;

/// Identifies a block by its header's byte offset from the heap's base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockOffset(pub usize);

impl BlockOffset {
  /// Offset of this block's first payload/link word.
  pub fn payload_offset(self) -> usize {
    self.0 + WORD_SIZE
  }
}

/// `ptr - WORD_SIZE`: recovers a block from a payload pointer's offset.
pub fn payload_to_block(payload_offset: usize) -> BlockOffset {
  BlockOffset(payload_offset - WORD_SIZE)
}

fn header_word(heap: &Heap, b: BlockOffset) -> i64 {
  heap.read_word(b.0)
}

/// Size of the whole block (header + payload + footer), allocated bit
/// masked off.
pub fn size(heap: &Heap, b: BlockOffset) -> usize {
  (header_word(heap, b) as usize) & !1
}

/// `true` if `b`'s header marks it allocated.
pub fn allocated(heap: &Heap, b: BlockOffset) -> bool {
  header_word(heap, b) & 1 != 0
}

fn footer_offset(heap: &Heap, b: BlockOffset) -> usize {
  b.0 + size(heap, b) - WORD_SIZE
}

/// Size as read from the footer rather than the header - used to assert
/// boundary-tag consistency (`footer == header`).
pub fn end_size(heap: &Heap, b: BlockOffset) -> usize {
  (heap.read_word(footer_offset(heap, b)) as usize) & !1
}

/// Allocated bit as read from the footer.
pub fn end_allocated(heap: &Heap, b: BlockOffset) -> bool {
  heap.read_word(footer_offset(heap, b)) & 1 != 0
}

/// Sets `b`'s size in both header and footer, preserving the current
/// allocated bit.
///
/// # Panics
///
/// Panics (via `debug_assert!`) if `size` is not a multiple of `WORD_SIZE`.
pub fn set_size(heap: &mut Heap, b: BlockOffset, new_size: usize) {
  debug_assert_eq!(new_size & (WORD_SIZE - 1), 0, "block size must be word-aligned");
  let bit = header_word(heap, b) & 1;
  let header = (new_size as i64) | bit;
  heap.write_word(b.0, header);
  heap.write_word(b.0 + new_size - WORD_SIZE, header);
}

/// Sets `b`'s allocated flag in both header and footer, preserving size.
pub fn set_allocated(heap: &mut Heap, b: BlockOffset, alloc: bool) {
  let s = size(heap, b);
  let bit = alloc as i64;
  let header = (s as i64) | bit;
  heap.write_word(b.0, header);
  heap.write_word(b.0 + s - WORD_SIZE, header);
}

/// Combined size + allocated-bit write, one header/footer pass instead of
/// two.
pub fn set_size_and_allocated(heap: &mut Heap, b: BlockOffset, new_size: usize, alloc: bool) {
  debug_assert_eq!(new_size & (WORD_SIZE - 1), 0, "block size must be word-aligned");
  let header = (new_size as i64) | (alloc as i64);
  heap.write_word(b.0, header);
  heap.write_word(b.0 + new_size - WORD_SIZE, header);
}

/// The physically next block (`b + size(b)`). Valid for any `b` up to and
/// including the last real block - past the epilogue this walks off the
/// committed heap, which no caller in this crate ever does because the
/// epilogue is always allocated.
pub fn next(heap: &Heap, b: BlockOffset) -> BlockOffset {
  BlockOffset(b.0 + size(heap, b))
}

/// The physically previous block, found by reading the word immediately
/// before `b` - which, by the no-gaps heap partition invariant, is always
/// the previous block's footer.
///
/// ```text
///   ...[ prev footer ][ b's header ]...
///       ▲               ▲
///       b.0 - WORD_SIZE  b.0
/// ```
///
/// Only valid when `b` is not the prologue (the prologue has no physical
/// predecessor).
pub fn prev(heap: &Heap, b: BlockOffset) -> BlockOffset {
  let prev_size = (heap.read_word(b.0 - WORD_SIZE) as usize) & !1;
  BlockOffset(b.0 - prev_size)
}

/// Reads a free block's forward free-list link (payload word 0).
///
/// # Panics
///
/// Debug-asserts `b` is free - flink/blink are only meaningful in a free
/// block's payload.
pub fn flink(heap: &Heap, b: BlockOffset) -> BlockOffset {
  debug_assert!(!allocated(heap, b), "flink read on allocated block");
  BlockOffset(heap.read_word(b.payload_offset()) as usize)
}

/// Reads a free block's backward free-list link (payload word 1).
pub fn blink(heap: &Heap, b: BlockOffset) -> BlockOffset {
  debug_assert!(!allocated(heap, b), "blink read on allocated block");
  BlockOffset(heap.read_word(b.payload_offset() + WORD_SIZE) as usize)
}

/// Sets `b`'s forward free-list link.
pub fn set_flink(heap: &mut Heap, b: BlockOffset, target: BlockOffset) {
  debug_assert!(!allocated(heap, b));
  debug_assert!(!allocated(heap, target));
  heap.write_word(b.payload_offset(), target.0 as i64);
}

/// Sets `b`'s backward free-list link.
pub fn set_blink(heap: &mut Heap, b: BlockOffset, target: BlockOffset) {
  debug_assert!(!allocated(heap, b));
  debug_assert!(!allocated(heap, target));
  heap.write_word(b.payload_offset() + WORD_SIZE, target.0 as i64);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::heap::Heap;

  /// Lays out two adjacent blocks by hand (no allocator involved) so the
  /// primitives can be tested in isolation.
  fn two_block_heap() -> (Heap, BlockOffset, BlockOffset) {
    let mut heap = Heap::new();
    heap.grow(64).unwrap();
    let a = BlockOffset(0);
    let b = BlockOffset(32);
    set_size_and_allocated(&mut heap, a, 32, true);
    set_size_and_allocated(&mut heap, b, 32, false);
    (heap, a, b)
  }

  #[test]
  fn size_and_allocated_round_trip() {
    let (heap, a, b) = two_block_heap();
    assert_eq!(size(&heap, a), 32);
    assert!(allocated(&heap, a));
    assert_eq!(size(&heap, b), 32);
    assert!(!allocated(&heap, b));
  }

  #[test]
  fn footer_mirrors_header() {
    let (heap, a, b) = two_block_heap();
    assert_eq!(end_size(&heap, a), size(&heap, a));
    assert_eq!(end_allocated(&heap, a), allocated(&heap, a));
    assert_eq!(end_size(&heap, b), size(&heap, b));
    assert_eq!(end_allocated(&heap, b), allocated(&heap, b));
  }

  #[test]
  fn set_size_preserves_allocated_bit() {
    let mut heap = Heap::new();
    heap.grow(64).unwrap();
    let blk = BlockOffset(0);
    set_size_and_allocated(&mut heap, blk, 64, true);
    set_size(&mut heap, blk, 32);
    assert_eq!(size(&heap, blk), 32);
    assert!(allocated(&heap, blk));
  }

  #[test]
  fn set_allocated_preserves_size() {
    let mut heap = Heap::new();
    heap.grow(64).unwrap();
    let blk = BlockOffset(0);
    set_size_and_allocated(&mut heap, blk, 64, true);
    set_allocated(&mut heap, blk, false);
    assert_eq!(size(&heap, blk), 64);
    assert!(!allocated(&heap, blk));
  }

  #[test]
  fn next_and_prev_are_inverses() {
    let (heap, a, b) = two_block_heap();
    assert_eq!(next(&heap, a), b);
    assert_eq!(prev(&heap, b), a);
  }

  #[test]
  fn payload_to_block_inverts_payload_offset() {
    let blk = BlockOffset(128);
    assert_eq!(payload_to_block(blk.payload_offset()), blk);
  }

  #[test]
  fn flink_blink_round_trip_on_a_free_block() {
    let mut heap = Heap::new();
    heap.grow(96).unwrap();
    let a = BlockOffset(0);
    let b = BlockOffset(32);
    let c = BlockOffset(64);
    set_size_and_allocated(&mut heap, b, 32, false);
    set_flink(&mut heap, b, c);
    set_blink(&mut heap, b, a);
    assert_eq!(flink(&heap, b), c);
    assert_eq!(blink(&heap, b), a);
  }
}
