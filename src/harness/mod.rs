//! The trace-driven validation harness: parses traces, replays them against
//! an [`crate::allocator::Allocator`] three ways (correctness, utilization,
//! speed), and reports the results the way `mdriver.c`'s `main` does.
//!
//! ```text
//!   trace file -> trace::parse -> replay::validate   -> pass/fail
//!                               -> replay::utilization -> f64
//!                               -> replay::speed        -> Duration
//!                                        |
//!                                        v
//!                              report::Stats  ->  report::{table, csv}
//! ```
//!
//! `run` drives all three passes for a set of traces and assembles the
//! per-trace [`report::Stats`] the binary prints or writes out; `repl`
//! hosts the interactive single-command-at-a-time shell.

pub mod perf;
pub mod rangeset;
pub mod repl;
pub mod report;
pub mod replay;
pub mod trace;

use crate::allocator::{Allocator, AllocatorConfig};
use trace::Trace;

/// Runs all three passes (validity, utilization, speed) for one trace
/// against a freshly configured allocator, producing the [`report::Stats`]
/// row `mdriver.c`'s `main` loop builds per tracefile.
pub fn evaluate_trace(trace: &Trace, config: AllocatorConfig, speed_repeats: usize) -> report::Stats {
  let mut stats = report::Stats::new(trace.name.clone(), trace.ops.len());

  let mut allocator = Allocator::with_config(config);
  match replay::validate(trace, &mut allocator) {
    Ok(()) => stats.valid = true,
    Err(e) => {
      stats.error_msg = Some(e.to_string());
      return stats;
    }
  }

  let mut allocator = Allocator::with_config(config);
  match replay::utilization(trace, &mut allocator) {
    Ok(u) => stats.util = u,
    Err(e) => {
      stats.valid = false;
      stats.error_msg = Some(e.to_string());
      return stats;
    }
  }

  let mut allocator = Allocator::with_config(config);
  match replay::speed(trace, &mut allocator, speed_repeats) {
    Ok(d) => stats.secs = d.as_secs_f64(),
    Err(e) => {
      stats.valid = false;
      stats.error_msg = Some(e.to_string());
    }
  }

  stats
}

/// Runs [`evaluate_trace`] over every trace in `traces`, returning one
/// [`report::Stats`] per trace in the same order.
pub fn evaluate_all(traces: &[Trace], config: AllocatorConfig, speed_repeats: usize) -> Vec<report::Stats> {
  traces
    .iter()
    .map(|t| evaluate_trace(t, config, speed_repeats))
    .collect()
}
