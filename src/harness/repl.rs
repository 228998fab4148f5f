//! Interactive malloc shell, reimplementing `mdriver.c`'s `driver()` /
//! `malloc_cmd` / `free_cmd` / `remalloc_cmd` / `print_cmd` / `reset_cmd`.
//!
//! Unlike the trace replay passes, the REPL takes commands one at a time
//! from a line-oriented reader (normally stdin) and echoes a prompt, so it
//! is driven through a generic `BufRead`/`Write` pair rather than hardcoded
//! to stdio - this is what lets the REPL's command handling be exercised
//! by ordinary `#[test]`s instead of only by hand.

use std::io::{BufRead, Write};

use crate::allocator::Allocator;
use crate::block;
use crate::harness::rangeset::RangeSet;

/// One block the REPL is tracking, identified by the numeric id the user
/// typed in `malloc <id> <size>`.
#[derive(Clone, Copy)]
struct ReplBlock {
  offset: usize,
  size: usize,
}

/// REPL session state: the allocator under test, the range set used for
/// the same alignment/bounds/overlap checks the trace replay performs,
/// and the id -> block map.
pub struct Repl {
  allocator: Allocator,
  ranges: RangeSet,
  blocks: std::collections::HashMap<usize, ReplBlock>,
}

impl Repl {
  /// Creates a REPL with a freshly initialized allocator.
  pub fn new() -> Result<Self, crate::error::InitError> {
    let mut allocator = Allocator::new();
    allocator.init()?;
    Ok(Self {
      allocator,
      ranges: RangeSet::new(),
      blocks: std::collections::HashMap::new(),
    })
  }

  /// Runs the read-eval-print loop until EOF (or `quit`), writing prompts
  /// and output to `out`.
  pub fn run(&mut self, input: impl BufRead, mut out: impl Write) -> std::io::Result<()> {
    writeln!(out, "Welcome to the Malloc REPL. (Enter 'help' to see available commands.)")?;
    for line in input.lines() {
      write!(out, "> ")?;
      out.flush()?;
      let line = line?;
      let mut words = line.split_whitespace();
      let Some(cmd) = words.next() else { continue };
      let rest: Vec<&str> = words.collect();
      match cmd {
        "quit" | "q" => {
          break;
        }
        "help" | "h" => self.help(&mut out)?,
        "malloc" | "m" => self.malloc_cmd(&rest, &mut out)?,
        "free" | "f" => self.free_cmd(&rest, &mut out)?,
        "realloc" | "r" => self.realloc_cmd(&rest, &mut out)?,
        "print" | "p" => self.print_cmd(&rest, &mut out)?,
        "reset" => self.reset_cmd(&mut out)?,
        other => writeln!(out, "error: no valid command specified ({other})")?,
      }
    }
    Ok(())
  }

  fn help(&self, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "commands:")?;
    writeln!(out, "malloc <id> <size>   mallocs the block at <id> to a size <size>")?;
    writeln!(out, "realloc <id> <size>  reallocs the block at <id> to <size>")?;
    writeln!(out, "free <id>            frees block at <id>")?;
    writeln!(out, "print                prints the heap")?;
    writeln!(out, "reset                resets memory")?;
    writeln!(out, "quit                 quits repl")
  }

  fn malloc_cmd(&mut self, args: &[&str], out: &mut impl Write) -> std::io::Result<()> {
    let (Some(id), Some(size)) = (parse(args, 0), parse(args, 1)) else {
      return writeln!(out, "usage: malloc <id> <size>");
    };
    if self.blocks.contains_key(&id) {
      return writeln!(out, "ERROR: id already in use");
    }
    let Some(p) = self.allocator.malloc(size) else {
      if size == 0 {
        return Ok(());
      }
      return writeln!(out, "ERROR: mm_malloc failed");
    };
    if let Err(e) = self.ranges.insert(p, size, self.allocator.heap().lo(), self.allocator.heap().hi() - 1) {
      return writeln!(out, "ERROR: {e}");
    }
    self.allocator.payload_mut(p, size).fill((id & 0xFF) as u8);
    self.blocks.insert(id, ReplBlock { offset: p, size });
    writeln!(out, "malloc({id}, {size}) -> {p:#x}")
  }

  fn free_cmd(&mut self, args: &[&str], out: &mut impl Write) -> std::io::Result<()> {
    let Some(id) = parse(args, 0) else {
      return writeln!(out, "usage: free <id>");
    };
    let Some(b) = self.blocks.remove(&id) else {
      return writeln!(out, "ERROR: id not in use");
    };
    self.ranges.remove(b.offset);
    self.allocator.free(Some(b.offset));
    writeln!(out, "free({id})")
  }

  fn realloc_cmd(&mut self, args: &[&str], out: &mut impl Write) -> std::io::Result<()> {
    let (Some(id), Some(size)) = (parse(args, 0), parse(args, 1)) else {
      return writeln!(out, "usage: realloc <id> <size>");
    };
    let old = self.blocks.get(&id).copied();
    let oldp = old.map(|b| b.offset);
    let Some(newp) = self.allocator.realloc(oldp, size) else {
      if size == 0 {
        self.blocks.remove(&id);
        if let Some(b) = old {
          self.ranges.remove(b.offset);
        }
        return Ok(());
      }
      return writeln!(out, "ERROR: mm_realloc failed");
    };
    if let Some(b) = old {
      self.ranges.remove(b.offset);
    }
    if let Err(e) = self.ranges.insert(newp, size, self.allocator.heap().lo(), self.allocator.heap().hi() - 1) {
      return writeln!(out, "ERROR: {e}");
    }
    self.allocator.payload_mut(newp, size).fill((id & 0xFF) as u8);
    self.blocks.insert(id, ReplBlock { offset: newp, size });
    writeln!(out, "realloc({id}, {size}) -> {newp:#x}")
  }

  fn print_cmd(&self, args: &[&str], out: &mut impl Write) -> std::io::Result<()> {
    if let Some(id) = parse(args, 0) {
      let Some(b) = self.blocks.get(&id) else {
        return writeln!(out, "block[{id}] is not allocated");
      };
      return writeln!(out, "block[{id}] allocated \tblock at {:#x} \tsize {}", b.offset, b.size);
    }

    writeln!(out, "heap size: {}", self.allocator.heap().size())?;
    for b in self.allocator.iter_blocks() {
      let size = block::size(self.allocator.heap(), b);
      if b == self.allocator.prologue() {
        writeln!(out, "prologue \t\tblock at {:#x} \tsize {size}", b.0)?;
      } else if b == self.allocator.epilogue() {
        writeln!(out, "epilogue \t\tblock at {:#x} \tsize {size}", b.0)?;
      } else if block::allocated(self.allocator.heap(), b) {
        writeln!(out, "block allocated \tblock at {:#x} \tsize {size}", b.0)?;
      } else {
        let flink = block::flink(self.allocator.heap(), b).0;
        let blink = block::blink(self.allocator.heap(), b).0;
        writeln!(out, "free block \t\tblock at {:#x} \tsize {size} \tNext: {flink:#x}\tPrev: {blink:#x}", b.0)?;
      }
    }
    Ok(())
  }

  fn reset_cmd(&mut self, out: &mut impl Write) -> std::io::Result<()> {
    self.allocator = Allocator::new();
    if self.allocator.init().is_err() {
      return writeln!(out, "ERROR: mm_init failed");
    }
    self.ranges.clear();
    self.blocks.clear();
    writeln!(out, "reset")
  }
}

fn parse(args: &[&str], idx: usize) -> Option<usize> {
  args.get(idx)?.parse().ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn run(commands: &str) -> String {
    let mut repl = Repl::new().unwrap();
    let mut out = Vec::new();
    repl.run(Cursor::new(commands.as_bytes()), &mut out).unwrap();
    String::from_utf8(out).unwrap()
  }

  #[test]
  fn malloc_then_free_round_trips() {
    let out = run("malloc 0 32\nfree 0\nquit\n");
    assert!(out.contains("malloc(0, 32)"));
    assert!(out.contains("free(0)"));
  }

  #[test]
  fn malloc_reusing_an_id_is_rejected() {
    let out = run("malloc 0 32\nmalloc 0 16\nquit\n");
    assert!(out.contains("already in use"));
  }

  #[test]
  fn free_of_unknown_id_is_rejected() {
    let out = run("free 7\nquit\n");
    assert!(out.contains("not in use"));
  }

  #[test]
  fn realloc_grows_a_live_block() {
    let out = run("malloc 0 16\nrealloc 0 128\nquit\n");
    assert!(out.contains("realloc(0, 128)"));
  }

  #[test]
  fn print_shows_prologue_and_epilogue() {
    let out = run("malloc 0 16\nprint\nquit\n");
    assert!(out.contains("prologue"));
    assert!(out.contains("epilogue"));
    assert!(out.contains("block allocated"));
  }

  #[test]
  fn reset_clears_all_live_blocks() {
    let out = run("malloc 0 16\nreset\nfree 0\nquit\n");
    assert!(out.contains("reset"));
    assert!(out.contains("not in use"));
  }

  #[test]
  fn unknown_command_reports_an_error() {
    let out = run("bogus\nquit\n");
    assert!(out.contains("no valid command"));
  }
}
