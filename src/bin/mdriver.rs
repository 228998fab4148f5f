//! `mdriver` - the command-line front end for the allocator's trace-driven
//! validation harness, reimplementing `mdriver.c`'s `main` and flag set:
//! `-f`, `-t`, `-l`, `-v`/`-V`, `-G`, `-g`, `-r`, `-h`.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use rallocator::allocator::AllocatorConfig;
use rallocator::harness::trace::Trace;
use rallocator::harness::{evaluate_all, report};

/// Default directory the harness looks for tracefiles in when neither
/// `-f` nor `-t` is given, matching `config.h`'s `TRACEDIR`.
const DEFAULT_TRACEDIR: &str = "./traces/";

#[derive(Parser, Debug)]
#[command(name = "mdriver", about = "Trace-driven allocator correctness and efficiency harness")]
struct Cli {
  /// Use a single trace file instead of the default set.
  #[arg(short = 'f', value_name = "FILE")]
  file: Option<PathBuf>,

  /// Directory to find default tracefiles in.
  #[arg(short = 't', value_name = "DIR")]
  tracedir: Option<PathBuf>,

  /// Also benchmark the system allocator on the same traces.
  #[arg(short = 'l')]
  libc: bool,

  /// Print per-trace performance breakdowns.
  #[arg(short = 'v')]
  verbose: bool,

  /// Print additional debug info.
  #[arg(short = 'V')]
  very_verbose: bool,

  /// Write a `gradescope-report.txt` CSV report.
  #[arg(short = 'G')]
  gradescope: bool,

  /// Emit `correct:`/`perfidx:` lines for an autograder.
  #[arg(short = 'g')]
  autograder: bool,

  /// Launch the interactive malloc REPL instead of running traces.
  #[arg(short = 'r')]
  repl: bool,
}

fn main() -> Result<()> {
  env_logger::init();
  let cli = Cli::parse();

  if cli.repl {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut repl = rallocator::harness::repl::Repl::new().context("failed to initialize the REPL's allocator")?;
    repl.run(stdin.lock(), stdout.lock())?;
    return Ok(());
  }

  let verbose = cli.verbose || cli.very_verbose;
  let (tracedir, filenames) = resolve_tracefiles(&cli);

  if !cli.gradescope && cli.file.is_none() {
    println!("Using default tracefiles in {}", tracedir.display());
  }

  let traces = filenames
    .iter()
    .map(|name| read_trace(&tracedir, name))
    .collect::<Result<Vec<_>>>()?;

  if cli.libc {
    if cli.very_verbose {
      println!("\nTesting libc malloc");
    }
    let libc_stats: Vec<report::Stats> = traces.iter().map(eval_libc).collect();
    if verbose {
      println!("\nResults for libc malloc:");
      report::print_results(&libc_stats);
    }
  }

  if cli.very_verbose {
    println!("\nTesting mm malloc");
  }
  let mm_stats = evaluate_all(&traces, AllocatorConfig::default(), 3);

  if verbose {
    println!("\nResults for mm malloc:");
    report::print_results(&mm_stats);
    println!();
  }

  if cli.gradescope {
    report::write_gradescope_report(Path::new("./gradescope-report.txt"), &mm_stats)
      .context("failed writing gradescope-report.txt")?;
  }
  if !verbose {
    report::print_passed(&mm_stats);
  }

  if !cli.gradescope {
    let num_correct = mm_stats.iter().filter(|s| s.valid).count();
    let any_errors = mm_stats.iter().any(|s| !s.valid);
    let secs: f64 = mm_stats.iter().map(|s| s.secs).sum();
    let ops: f64 = mm_stats.iter().map(|s| s.ops as f64).sum();
    let util: f64 = mm_stats.iter().map(|s| s.util).sum();
    let mut perf_index = rallocator::harness::perf::compute_performance_index(mm_stats.len().max(1), secs, ops, util);
    if any_errors {
      perf_index = 0.0;
      println!("Terminated with {} errors", mm_stats.iter().filter(|s| !s.valid).count());
    }
    if cli.autograder {
      report::print_autograder_summary(num_correct, perf_index);
    }
  }

  Ok(())
}

/// Resolves `-f`/`-t` into a `(tracedir, filenames)` pair the way
/// `mdriver.c`'s flag handling does: `-f` wins outright (tracedir becomes
/// empty, one file); otherwise `-t` overrides the default directory; the
/// filename list is always the default set unless `-f` narrows it to one.
fn resolve_tracefiles(cli: &Cli) -> (PathBuf, Vec<String>) {
  if let Some(file) = &cli.file {
    return (PathBuf::new(), vec![file.display().to_string()]);
  }
  let tracedir = cli.tracedir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TRACEDIR));
  let filenames = report::default_tracefiles().into_iter().map(String::from).collect();
  (tracedir, filenames)
}

fn read_trace(tracedir: &Path, filename: &str) -> Result<Trace> {
  let path = tracedir.join(filename);
  let contents = fs::read_to_string(&path).with_context(|| format!("could not open {}", path.display()))?;
  info!("read tracefile {}", path.display());
  Trace::parse(filename, &contents).with_context(|| format!("malformed trace {}", path.display()))
}

/// Benchmarks the system allocator on `trace`, exactly as `eval_libc_valid`
/// / `eval_libc_speed` do: no range-set bookkeeping (the system allocator
/// is trusted to be correct), just timed alloc/realloc/free. `util` is
/// always `0.0`, matching `stats_t`'s "always 0 for libc" comment.
fn eval_libc(trace: &Trace) -> report::Stats {
  let mut stats = report::Stats::new(trace.name.clone(), trace.ops.len());
  let mut blocks: HashMap<usize, (*mut u8, Layout)> = HashMap::new();

  let start = Instant::now();
  for op in &trace.ops {
    match *op {
      rallocator::harness::trace::TraceOp::Alloc { index, size } => {
        if size == 0 {
          continue;
        }
        let layout = Layout::from_size_align(size, 8).unwrap();
        let p = unsafe { alloc::alloc(layout) };
        if p.is_null() {
          stats.error_msg = Some(format!("libc malloc failed for {size} bytes"));
          return stats;
        }
        blocks.insert(index, (p, layout));
      }
      rallocator::harness::trace::TraceOp::Realloc { index, size } => {
        let Some((old_p, old_layout)) = blocks.remove(&index) else {
          warn!("realloc of unknown block {index} in libc benchmark");
          continue;
        };
        if size == 0 {
          unsafe { alloc::dealloc(old_p, old_layout) };
          continue;
        }
        let new_p = unsafe { alloc::realloc(old_p, old_layout, size) };
        if new_p.is_null() {
          stats.error_msg = Some(format!("libc realloc failed for {size} bytes"));
          return stats;
        }
        blocks.insert(index, (new_p, Layout::from_size_align(size, 8).unwrap()));
      }
      rallocator::harness::trace::TraceOp::Free { index } => {
        if let Some((p, layout)) = blocks.remove(&index) {
          unsafe { alloc::dealloc(p, layout) };
        }
      }
    }
  }
  stats.valid = true;
  stats.secs = start.elapsed().as_secs_f64();
  stats
}
