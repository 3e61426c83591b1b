//! Per-iteration results and the sink that consumes them.

use crate::system_metrics::SystemSnapshot;
use bench_common::error::BenchResult;
use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;

/// Result of one measured iteration. Immutable once built.
#[derive(Debug, Clone)]
pub struct IterationReport {
    load: u32,
    runtime: Duration,
    deadline: Histogram<u64>,
    period: Histogram<u64>,
    hiccup: Histogram<u64>,
    metrics_before: SystemSnapshot,
    metrics_after: SystemSnapshot,
    metrics_comparison: String,
}

impl IterationReport {
    /// Assemble a report from the harvested histograms and metric snapshots.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        load: u32,
        runtime: Duration,
        deadline: Histogram<u64>,
        period: Histogram<u64>,
        hiccup: Histogram<u64>,
        metrics_before: SystemSnapshot,
        metrics_after: SystemSnapshot,
        metrics_comparison: String,
    ) -> Self {
        Self {
            load,
            runtime,
            deadline,
            period,
            hiccup,
            metrics_before,
            metrics_after,
            metrics_comparison,
        }
    }

    /// Load the workload ran at.
    #[must_use]
    pub fn load(&self) -> u32 {
        self.load
    }

    /// Wall-clock runtime bound of the iteration.
    #[must_use]
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// Duration of each workload invocation, in nanoseconds.
    #[must_use]
    pub fn deadline(&self) -> &Histogram<u64> {
        &self.deadline
    }

    /// Time between consecutive invocation starts, in nanoseconds.
    #[must_use]
    pub fn period(&self) -> &Histogram<u64> {
        &self.period
    }

    /// Hiccup sampler wake-up intervals, in nanoseconds.
    #[must_use]
    pub fn hiccup(&self) -> &Histogram<u64> {
        &self.hiccup
    }

    /// Counters captured before the timed loop.
    #[must_use]
    pub fn metrics_before(&self) -> &SystemSnapshot {
        &self.metrics_before
    }

    /// Counters captured after the timed loop.
    #[must_use]
    pub fn metrics_after(&self) -> &SystemSnapshot {
        &self.metrics_after
    }

    /// Human-readable before/after comparison.
    #[must_use]
    pub fn metrics_comparison(&self) -> &str {
        &self.metrics_comparison
    }

    /// Condensed statistics of all three distributions.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            load: self.load,
            runtime_ms: u64::try_from(self.runtime.as_millis()).unwrap_or(u64::MAX),
            deadline: HistogramSummary::from_histogram(&self.deadline),
            period: HistogramSummary::from_histogram(&self.period),
            hiccup: HistogramSummary::from_histogram(&self.hiccup),
            metrics_before: self.metrics_before,
            metrics_after: self.metrics_after,
        }
    }
}

/// Serializable summary of one [`IterationReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    /// Workload load.
    pub load: u32,
    /// Iteration runtime bound in milliseconds.
    pub runtime_ms: u64,
    /// Deadline distribution.
    pub deadline: HistogramSummary,
    /// Period distribution.
    pub period: HistogramSummary,
    /// Hiccup distribution.
    pub hiccup: HistogramSummary,
    /// Counters before the timed loop.
    pub metrics_before: SystemSnapshot,
    /// Counters after the timed loop.
    pub metrics_after: SystemSnapshot,
}

/// Key statistics of a latency histogram, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramSummary {
    /// Number of samples, including coordinated-omission backfill.
    pub count: u64,
    /// Smallest sample.
    pub min: u64,
    /// Largest sample.
    pub max: u64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Standard deviation.
    pub stdev: f64,
    /// Median.
    pub p50: u64,
    /// 90th percentile.
    pub p90: u64,
    /// 99th percentile.
    pub p99: u64,
    /// 99.9th percentile.
    pub p999: u64,
}

impl HistogramSummary {
    /// Summarize a histogram. An empty histogram yields all zeros.
    #[must_use]
    pub fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self {
                count: 0,
                min: 0,
                max: 0,
                mean: 0.0,
                stdev: 0.0,
                p50: 0,
                p90: 0,
                p99: 0,
                p999: 0,
            };
        }
        Self {
            count: histogram.len(),
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            stdev: histogram.stdev(),
            p50: histogram.value_at_quantile(0.5),
            p90: histogram.value_at_quantile(0.9),
            p99: histogram.value_at_quantile(0.99),
            p999: histogram.value_at_quantile(0.999),
        }
    }
}

/// Consumer of iteration reports.
///
/// Receives exactly one report per load value, in load order. A run that
/// fails emits nothing further.
pub trait ReportSink {
    /// Take ownership of a finished iteration's report.
    ///
    /// # Errors
    ///
    /// Returns [`bench_common::error::BenchError::Resource`] if the report
    /// cannot be stored; the run aborts.
    fn emit(&mut self, report: IterationReport) -> BenchResult<()>;

    /// Record a line in the run log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    fn note(&mut self, _line: &str) -> BenchResult<()> {
        Ok(())
    }
}

impl ReportSink for Vec<IterationReport> {
    fn emit(&mut self, report: IterationReport) -> BenchResult<()> {
        self.push(report);
        Ok(())
    }
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn emit(&mut self, report: IterationReport) -> BenchResult<()> {
        (**self).emit(report)
    }

    fn note(&mut self, line: &str) -> BenchResult<()> {
        (**self).note(line)
    }
}
