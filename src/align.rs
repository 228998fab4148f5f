//! Alignment helpers.
//!
//! Every on-heap quantity (block size, payload request) is rounded up to a
//! multiple of [`WORD_SIZE`] before use. Pinned to a fixed 8-byte word
//! rather than `mem::size_of::<usize>()`, since the on-heap layout isn't
//! generic over pointer width; expressed as a `const fn` so it can be used
//! in const contexts as well as hot paths.

/// Size of a heap word in bytes. The header, footer, and free-list links are
/// all one word wide.
pub const WORD_SIZE: usize = size_of::<i64>();

/// Rounds `size` up to the nearest multiple of [`WORD_SIZE`].
///
/// # Examples
///
/// ```
/// use rallocator::align::align_up;
/// assert_eq!(align_up(0), 0);
/// assert_eq!(align_up(1), 8);
/// assert_eq!(align_up(8), 8);
/// assert_eq!(align_up(9), 16);
/// ```
pub const fn align_up(size: usize) -> usize {
  (size + (WORD_SIZE - 1)) & !(WORD_SIZE - 1)
}

/// `true` iff `size` is already word-aligned.
pub const fn is_aligned(size: usize) -> bool {
  size & (WORD_SIZE - 1) == 0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_up() {
    for i in 0..10 {
      let sizes = (WORD_SIZE * i + 1)..=(WORD_SIZE * (i + 1));
      let expected = WORD_SIZE * (i + 1);
      for size in sizes {
        assert_eq!(expected, align_up(size));
      }
    }
  }

  #[test]
  fn zero_aligns_to_zero() {
    assert_eq!(align_up(0), 0);
    assert!(is_aligned(0));
  }

  #[test]
  fn is_aligned_matches_align_up_fixpoint() {
    for size in 0..200usize {
      assert_eq!(is_aligned(size), align_up(size) == size);
    }
  }
}
