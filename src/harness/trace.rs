//! Trace file parsing.
//!
//! Format (whitespace-separated, exactly as `mdriver.c`'s `read_trace`
//! expects it):
//!
//! ```text
//!   <sugg_heapsize> <num_ids> <num_ops> <weight>
//!   a <index> <size>     # allocate `size` bytes, remember as block `index`
//!   r <index> <size>     # reallocate block `index` to `size` bytes
//!   f <index>             # free block `index`
//!   ...                   # exactly num_ops of the above
//! ```
//!
//! `sugg_heapsize` and `weight` are part of the header but, per the
//! original driver's own comments, unused by anything downstream - kept
//! here only so the header's field count and meaning match the format
//! exactly.

use thiserror::Error;

/// A single allocation request recorded in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
  Alloc { index: usize, size: usize },
  Realloc { index: usize, size: usize },
  Free { index: usize },
}

/// A parsed trace file: its header fields plus the ordered list of
/// operations to replay.
#[derive(Debug, Clone)]
pub struct Trace {
  pub name: String,
  pub sugg_heapsize: usize,
  pub num_ids: usize,
  pub weight: usize,
  pub ops: Vec<TraceOp>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
  #[error("trace header must have 4 integers (sugg_heapsize num_ids num_ops weight)")]
  BadHeader,
  #[error("line {line}: malformed operation")]
  BadOpLine { line: usize },
  #[error("line {line}: unknown operation type '{ch}'")]
  UnknownOpType { line: usize, ch: char },
  #[error("trace declared {declared} ops but contained {actual}")]
  OpCountMismatch { declared: usize, actual: usize },
  #[error("trace declared {declared} ids but the highest index used was {highest}")]
  IdCountMismatch { declared: usize, highest: usize },
}

impl Trace {
  /// Parses a trace's full textual contents.
  pub fn parse(name: &str, contents: &str) -> Result<Trace, TraceError> {
    let mut tokens = contents.split_whitespace();

    let sugg_heapsize: usize = next_uint(&mut tokens).ok_or(TraceError::BadHeader)?;
    let num_ids: usize = next_uint(&mut tokens).ok_or(TraceError::BadHeader)?;
    let num_ops: usize = next_uint(&mut tokens).ok_or(TraceError::BadHeader)?;
    let weight: usize = next_uint(&mut tokens).ok_or(TraceError::BadHeader)?;

    let mut ops = Vec::with_capacity(num_ops);
    let mut max_index = 0usize;
    let mut line = 5; // HDRLINES + 1, matching the original's LINENUM origin

    while let Some(tok) = tokens.next() {
      let ch = tok.chars().next().ok_or(TraceError::BadOpLine { line })?;
      let op = match ch {
        'a' => {
          let index = next_uint(&mut tokens).ok_or(TraceError::BadOpLine { line })?;
          let size = next_uint(&mut tokens).ok_or(TraceError::BadOpLine { line })?;
          max_index = max_index.max(index);
          TraceOp::Alloc { index, size }
        }
        'r' => {
          let index = next_uint(&mut tokens).ok_or(TraceError::BadOpLine { line })?;
          let size = next_uint(&mut tokens).ok_or(TraceError::BadOpLine { line })?;
          max_index = max_index.max(index);
          TraceOp::Realloc { index, size }
        }
        'f' => {
          let index = next_uint(&mut tokens).ok_or(TraceError::BadOpLine { line })?;
          TraceOp::Free { index }
        }
        other => return Err(TraceError::UnknownOpType { line, ch: other }),
      };
      ops.push(op);
      line += 1;
    }

    if ops.len() != num_ops {
      return Err(TraceError::OpCountMismatch {
        declared: num_ops,
        actual: ops.len(),
      });
    }
    if num_ids > 0 && max_index != num_ids - 1 {
      return Err(TraceError::IdCountMismatch {
        declared: num_ids,
        highest: max_index,
      });
    }

    Ok(Trace {
      name: name.to_string(),
      sugg_heapsize,
      num_ids,
      weight,
      ops,
    })
  }
}

fn next_uint<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<usize> {
  tokens.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_minimal_trace() {
    let text = "0 2 3 0\na 0 16\na 1 32\nf 0\n";
    let trace = Trace::parse("t", text).unwrap();
    assert_eq!(trace.num_ids, 2);
    assert_eq!(
      trace.ops,
      vec![
        TraceOp::Alloc { index: 0, size: 16 },
        TraceOp::Alloc { index: 1, size: 32 },
        TraceOp::Free { index: 0 },
      ]
    );
  }

  #[test]
  fn parses_realloc_ops() {
    let text = "0 1 2 0\na 0 16\nr 0 64\n";
    let trace = Trace::parse("t", text).unwrap();
    assert_eq!(trace.ops[1], TraceOp::Realloc { index: 0, size: 64 });
  }

  #[test]
  fn rejects_op_count_mismatch() {
    let text = "0 1 5 0\na 0 16\n";
    assert_eq!(
      Trace::parse("t", text),
      Err(TraceError::OpCountMismatch {
        declared: 5,
        actual: 1
      })
    );
  }

  #[test]
  fn rejects_unknown_op_type() {
    let text = "0 1 1 0\nx 0 16\n";
    assert!(matches!(
      Trace::parse("t", text),
      Err(TraceError::UnknownOpType { ch: 'x', .. })
    ));
  }

  #[test]
  fn rejects_bad_header() {
    assert_eq!(Trace::parse("t", "0 1 1\n"), Err(TraceError::BadHeader));
  }
}
