//! Free-list splice operations over the circular, doubly linked list of
//! free blocks.
//!
//! The list head (`flist_first` in the original allocator) lives on the
//! [`crate::allocator::Allocator`], not on the heap; `insert`/`pull` take it
//! as an explicit `&mut Option<BlockOffset>` so these functions stay pure
//! with respect to any particular allocator instance.

use crate::block::{self, BlockOffset};
use crate::heap::Heap;

/// Splices `fb` into the free list as the new head.
///
/// ```text
///   before: head -> H -> ... -> T -> (back to H)
///   after:  head -> fb -> H -> ... -> T -> (back to fb)
/// ```
pub fn insert(heap: &mut Heap, head: &mut Option<BlockOffset>, fb: BlockOffset) {
  debug_assert!(!block::allocated(heap, fb));
  match *head {
    None => {
      block::set_flink(heap, fb, fb);
      block::set_blink(heap, fb, fb);
    }
    Some(h) => {
      let t = block::blink(heap, h);
      block::set_flink(heap, t, fb);
      block::set_blink(heap, fb, t);
      block::set_flink(heap, fb, h);
      block::set_blink(heap, h, fb);
    }
  }
  *head = Some(fb);
}

/// Removes `fb` from the free list it belongs to.
pub fn pull(heap: &mut Heap, head: &mut Option<BlockOffset>, fb: BlockOffset) {
  debug_assert!(!block::allocated(heap, fb));
  let next = block::flink(heap, fb);
  if next == fb {
    *head = None;
    return;
  }
  let prev = block::blink(heap, fb);
  block::set_flink(heap, prev, next);
  block::set_blink(heap, next, prev);
  if *head == Some(fb) {
    *head = Some(next);
  }
}

/// Counts the free blocks reachable from `head`, walking `flink` until the
/// head recurs. Used by tests and by the harness's well-formedness checks,
/// never by the allocator itself.
pub fn len(heap: &Heap, head: Option<BlockOffset>) -> usize {
  let Some(head) = head else { return 0 };
  let mut count = 1;
  let mut cur = block::flink(heap, head);
  while cur != head {
    count += 1;
    cur = block::flink(heap, cur);
  }
  count
}
