//! Performance index and the per-trace baseline utilization thresholds
//! `printpassed` checks results against.

/// Reference throughput (ops/sec) a libc-quality allocator hits on these
/// traces. Once a trace's measured throughput reaches this, further speed
/// buys no extra score - this deters "fast but stupid" allocators.
pub const AVG_LIBC_THRUPUT: f64 = 600_000.0;

/// Weight given to space utilization in the performance index; throughput
/// gets `1.0 - UTIL_WEIGHT`.
pub const UTIL_WEIGHT: f64 = 0.80;

/// `name` / minimum utilization a trace must hit to count as "passed" by
/// [`crate::harness::report::print_passed`]. All base traces only require
/// internal consistency (`0.0`); the coalescing and realloc traces require
/// the allocator to actually exploit those behaviors to pass.
pub const TRACE_BASELINE_TABLE: &[(&str, f64)] = &[
  ("amptjp-bal.rep", 0.0),
  ("cccp-bal.rep", 0.0),
  ("cp-decl-bal.rep", 0.0),
  ("expr-bal.rep", 0.0),
  ("random-bal.rep", 0.0),
  ("random2-bal.rep", 0.0),
  ("binary-bal.rep", 0.0),
  ("binary2-bal.rep", 0.0),
  ("coalescing-bal.rep", 0.90),
  ("coalescing2-bal.rep", 0.90),
  ("realloc-bal.rep", 0.45),
  ("realloc2-bal.rep", 0.45),
];

/// Minimum utilization `trace_name` must reach to pass, if it appears in
/// the baseline table.
pub fn baseline_min_util(trace_name: &str) -> Option<f64> {
  TRACE_BASELINE_TABLE
    .iter()
    .find(|(name, _)| *name == trace_name)
    .map(|(_, min_util)| *min_util)
}

/// Weighted combination of average utilization and a throughput score
/// capped at 1.0 once `avg_throughput` reaches [`AVG_LIBC_THRUPUT`].
pub fn compute_performance_index(num_tracefiles: usize, secs: f64, ops: f64, util: f64) -> f64 {
  let avg_util = util / num_tracefiles as f64;
  let avg_throughput = ops / secs;
  let throughput_score = (avg_throughput / AVG_LIBC_THRUPUT).min(1.0);
  100.0 * (avg_util * UTIL_WEIGHT + (1.0 - UTIL_WEIGHT) * throughput_score)
}
