//! Measurement engine.
//!
//! A full run walks the lifecycle:
//! 1. Warm up: one iteration at load 1, then one at load 0 (both discarded)
//! 2. Clean up: advisory reclamation request to the host
//! 3. Measure: one iteration per value of the load sequence
//!
//! Each iteration busy-polls a monotonic clock. The calling thread is fully
//! occupied for the whole runtime; yielding would cost timing precision.

use crate::hiccup::HiccupSampler;
use crate::load_sequence::LoadSequence;
use crate::recorder::IntervalRecorder;
use crate::report::{HistogramSummary, IterationReport, ReportSink};
use crate::system_metrics::SystemMetrics;
use crate::workload::Workload;
use bench_common::config::{RunConfig, TaskSpec};
use bench_common::error::BenchResult;
use bench_common::state::{EngineState, StateMachine};
use bench_common::time::{duration_to_ns, MonotonicClock};
use std::hint::black_box;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Loads measured, in order.
    pub loads: Vec<u32>,
    /// Wall-clock time of the warmup stage.
    pub warmup: Duration,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
    /// Largest deadline sample over all iterations, in nanoseconds.
    pub worst_deadline_ns: u64,
    /// Largest hiccup sample over all iterations, in nanoseconds.
    pub worst_hiccup_ns: u64,
}

/// Drives a workload under a task's period and deadline.
pub struct MeasurementEngine<W: Workload, M: SystemMetrics> {
    task: TaskSpec,
    workload: W,
    metrics: M,
    config: RunConfig,
    /// Prototype; every run measures a fresh copy.
    sequence: LoadSequence,
    state: StateMachine,
}

impl<W: Workload, M: SystemMetrics> MeasurementEngine<W, M> {
    /// Create an engine after validating everything a run depends on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the run configuration is invalid
    /// (including a planned duration that overflows), if the load sequence
    /// would overflow, or if its largest load exceeds what the workload
    /// accepts. Nothing has been timed at that point.
    pub fn new(task: TaskSpec, workload: W, metrics: M, config: RunConfig) -> BenchResult<Self> {
        config.validate()?;
        let sequence = LoadSequence::for_task(&task, config.iterations)?;
        workload.check_load(sequence.peak())?;

        debug!(
            %task,
            workload = workload.name(),
            base_load = sequence.base(),
            iterations = sequence.length(),
            peak_load = sequence.peak(),
            "Measurement engine created"
        );

        Ok(Self {
            task,
            workload,
            metrics,
            config,
            sequence,
            state: StateMachine::new(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state.state()
    }

    /// The measured task.
    pub fn task(&self) -> &TaskSpec {
        &self.task
    }

    /// Run-level configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// A fresh copy of the load progression a run measures.
    pub fn loads(&self) -> LoadSequence {
        self.sequence.clone_fresh()
    }

    /// The workload being timed.
    pub fn workload(&self) -> &W {
        &self.workload
    }

    /// Planned wall-clock time of a full run: two warmup passes plus every iteration.
    pub fn planned_duration(&self) -> Duration {
        // Overflow is rejected by RunConfig::validate in new()
        self.config.planned_duration().unwrap_or(Duration::MAX)
    }

    /// Execute a full run, emitting one report per load value to `sink`.
    ///
    /// May be called again after a successful run; the same load
    /// progression is replayed.
    ///
    /// # Errors
    ///
    /// Any error aborts the run and leaves the engine in
    /// [`EngineState::Failed`]. Reports already emitted stay with the sink;
    /// no report is emitted for the iteration that failed. The failure is
    /// noted as the last line of the run log.
    pub fn run<S: ReportSink>(&mut self, mut sink: S) -> BenchResult<RunSummary> {
        match self.run_stages(&mut sink) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                let stage = self.state.state();
                self.state.enter_failed();
                error!(%stage, error = %e, "Run aborted");
                let line = format!("Benchmark failed during {stage}: {e}");
                if let Err(note_err) = sink.note(&line) {
                    warn!(error = %note_err, "Could not log run failure");
                }
                Err(e)
            }
        }
    }

    fn run_stages<S: ReportSink>(&mut self, sink: &mut S) -> BenchResult<RunSummary> {
        let run_start = Instant::now();

        self.state.transition(EngineState::Warming)?;
        info!("Stage 1: Warming up");
        sink.note("Stage 1: Warming up")?;
        let warmup = self.warmup()?;
        let snapshot = self.metrics.snapshot();
        sink.note(&format!(
            "Warmup completed in {}ms\n{}",
            warmup.as_millis(),
            self.metrics.describe(&snapshot)
        ))?;

        self.state.transition(EngineState::Cleanup)?;
        info!("Stage 2: Cleanup");
        sink.note("Stage 2: Cleanup")?;
        self.metrics.request_reclamation();

        self.state.transition(EngineState::Measuring)?;
        info!(
            iterations = self.config.iterations,
            runtime_s = self.config.iteration_runtime.as_secs(),
            "Stage 3: Benchmarking"
        );
        sink.note("Stage 3: Benchmarking")?;

        let iterations = self.config.iterations;
        let mut loads = Vec::with_capacity(iterations as usize);
        let mut worst_deadline_ns = 0;
        let mut worst_hiccup_ns = 0;

        let mut sequence = self.sequence.clone_fresh();
        let mut index = 0;
        while !sequence.is_exhausted() {
            let load = sequence.next_load()?;
            index += 1;
            info!(iteration = index, iterations, load, "Running iteration");
            sink.note(&format!("Running iteration {index} of {iterations} with {load} load"))?;

            let report = self.run_iteration(load, self.config.iteration_runtime)?;
            log_report(index, &report);

            worst_deadline_ns = worst_deadline_ns.max(report.deadline().max());
            worst_hiccup_ns = worst_hiccup_ns.max(report.hiccup().max());
            loads.push(load);

            sink.note(&format!("Task iteration with {load} load"))?;
            sink.note(report.metrics_comparison())?;
            sink.emit(report)?;
        }

        self.state.transition(EngineState::Done)?;
        let elapsed = run_start.elapsed();
        info!(elapsed_s = elapsed.as_secs(), "Run complete");
        sink.note(&format!(
            "Benchmark completed successfully in {}s",
            elapsed.as_secs()
        ))?;

        Ok(RunSummary {
            loads,
            warmup,
            elapsed,
            worst_deadline_ns,
            worst_hiccup_ns,
        })
    }

    /// Drive the environment to steady state, then exercise the measurement
    /// path once at load 0. Both results are discarded.
    fn warmup(&mut self) -> BenchResult<Duration> {
        let start = Instant::now();
        drop(self.run_iteration(1, self.config.warmup_runtime)?);
        let warmup = start.elapsed();
        drop(self.run_iteration(0, self.config.warmup_runtime)?);
        debug!(warmup_ms = warmup.as_millis(), "Warmup complete");
        Ok(warmup)
    }

    /// Measure one iteration at `load` for `runtime`.
    ///
    /// Each pass through the loop invokes the workload once, records its
    /// duration against the deadline and the time since the previous start
    /// against the period, then busy-waits for the rest of the period. The
    /// first pass has no previous start, so it contributes no period sample.
    /// A continuous task (period 0) runs passes back-to-back.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `load` exceeds the workload bound and
    /// a resource error if the hiccup sampler cannot run. Workload failures
    /// are propagated unchanged.
    pub fn run_iteration(&mut self, load: u32, runtime: Duration) -> BenchResult<IterationReport> {
        self.workload.check_load(load)?;

        let period_ns = self.task.period_ns;
        let deadline_ns = self.task.deadline_ns;
        let mut deadline = IntervalRecorder::new(&self.config.recorder)?;
        let mut period = IntervalRecorder::new(&self.config.recorder)?;

        let metrics_before = self.metrics.snapshot();
        let sampler = HiccupSampler::start(self.config.hiccup_interval, &self.config.recorder)?;

        let clock = MonotonicClock::start();
        let stop = clock.now_ns().saturating_add(duration_to_ns(runtime));
        let mut previous_start: Option<u64> = None;

        let outcome = loop {
            let start = clock.now_ns();
            if start >= stop {
                break Ok(());
            }

            match self.workload.generate_load(load) {
                Ok(footprint) => {
                    black_box(footprint);
                }
                Err(e) => break Err(e),
            }
            let elapsed = clock.now_ns().saturating_sub(start);

            deadline.record(elapsed, deadline_ns);
            if let Some(previous) = previous_start {
                period.record(start - previous, period_ns);
            }
            previous_start = Some(start);

            if period_ns > 0 {
                let release = start.saturating_add(period_ns).min(stop);
                while clock.now_ns() < release {
                    std::hint::spin_loop();
                }
            }
        };

        let hiccup = sampler.terminate()?;
        outcome?;
        let metrics_after = self.metrics.snapshot();
        let comparison = self.metrics.diff(&metrics_before, &metrics_after);

        Ok(IterationReport::new(
            load,
            runtime,
            deadline.harvest(),
            period.harvest(),
            hiccup,
            metrics_before,
            metrics_after,
            comparison,
        ))
    }
}

fn log_report(iteration: u32, report: &IterationReport) {
    let deadline = HistogramSummary::from_histogram(report.deadline());
    let period = HistogramSummary::from_histogram(report.period());
    let hiccup = HistogramSummary::from_histogram(report.hiccup());

    info!(
        iteration,
        load = report.load(),
        samples = deadline.count,
        deadline_p99_ns = deadline.p99,
        deadline_max_ns = deadline.max,
        period_mean_ns = period.mean,
        period_max_ns = period.max,
        hiccup_p99_ns = hiccup.p99,
        hiccup_max_ns = hiccup.max,
        "Iteration complete"
    );
}
