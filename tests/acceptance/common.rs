//! Common helpers for acceptance tests.

#![allow(dead_code)]

use bench_common::config::{RunConfig, TaskSpec};
use bench_common::error::BenchResult;
use bench_core::report::{HistogramSummary, IterationReport};
use bench_core::workload::Workload;
use std::time::Duration;

/// Nanoseconds per millisecond.
pub const MS: u64 = 1_000_000;

/// Run configuration scaled down for tests.
pub fn quick_config(iterations: u32, runtime: Duration) -> RunConfig {
    RunConfig {
        iterations,
        iteration_runtime: runtime,
        warmup_runtime: Duration::from_millis(20),
        ..Default::default()
    }
}

/// 25 Hz task with a 10 ms deadline starting at load 16.
pub fn fast_task() -> TaskSpec {
    TaskSpec::new(40 * MS, 10 * MS, 16)
}

/// Workload that records every load it is asked for.
#[derive(Debug, Default)]
pub struct RecordingWorkload {
    pub loads: Vec<u32>,
}

impl Workload for RecordingWorkload {
    fn name(&self) -> &str {
        "recording"
    }

    fn max_load(&self) -> u32 {
        u32::MAX
    }

    fn generate_load(&mut self, load: u32) -> BenchResult<usize> {
        self.loads.push(load);
        Ok(self.loads.len())
    }
}

/// Deadline, period and hiccup summaries of a report.
pub fn summarize(report: &IterationReport) -> [HistogramSummary; 3] {
    [
        HistogramSummary::from_histogram(report.deadline()),
        HistogramSummary::from_histogram(report.period()),
        HistogramSummary::from_histogram(report.hiccup()),
    ]
}

/// Print a one-line digest of a report for test logs.
pub fn print_report(report: &IterationReport) {
    let [deadline, period, hiccup] = summarize(report);
    println!(
        "load {:>6}: deadline p99 {:>10}ns, period mean {:>12.0}ns, hiccup max {:>10}ns",
        report.load(),
        deadline.p99,
        period.mean,
        hiccup.max
    );
}
