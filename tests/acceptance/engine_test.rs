//! Period and deadline accuracy of the timing loop.
//!
//! # Acceptance Criteria
//!
//! - Period mean within scheduling noise of the task period
//! - Deadline samples cluster at the spin workload's busy-wait time
//! - The first pass of an iteration contributes no period sample

use super::common::{fast_task, print_report, quick_config, summarize, MS};
use bench_common::config::TaskSpec;
use bench_common::state::EngineState;
use bench_core::engine::MeasurementEngine;
use bench_core::report::IterationReport;
use bench_core::system_metrics::{NullMetrics, ProcessMetrics};
use bench_core::workload::{RandomMemoryLoad, SpinLoad};
use std::time::Duration;

#[test]
fn test_single_window_matches_task_timing() {
    let mut engine = MeasurementEngine::new(
        fast_task(),
        SpinLoad,
        NullMetrics,
        quick_config(1, Duration::from_millis(100)),
    )
    .unwrap();

    let report = engine.run_iteration(16, Duration::from_millis(100)).unwrap();
    print_report(&report);
    let [deadline, period, _] = summarize(&report);

    // Passes start at 0, 40 and 80 ms
    assert!((2..=3).contains(&deadline.count), "passes: {}", deadline.count);
    assert_eq!(period.count, deadline.count - 1);

    assert!(period.mean >= 39.9 * MS as f64, "period mean {}", period.mean);
    assert!(period.mean < 60.0 * MS as f64, "period mean {}", period.mean);

    // 16 load units of 1 µs each
    assert!(deadline.min >= 15_900, "deadline min {}", deadline.min);
    assert!(deadline.p50 < MS, "deadline median {}", deadline.p50);
}

#[test]
fn test_full_run_doubles_load() {
    let mut engine = MeasurementEngine::new(
        fast_task(),
        SpinLoad,
        ProcessMetrics::new(),
        quick_config(3, Duration::from_millis(120)),
    )
    .unwrap();

    let mut reports: Vec<IterationReport> = Vec::new();
    let summary = engine.run(&mut reports).unwrap();
    assert_eq!(engine.state(), EngineState::Done);
    assert_eq!(summary.loads, vec![16, 32, 64]);

    for report in &reports {
        print_report(report);
        let [deadline, period, hiccup] = summarize(report);
        let busy_ns = u64::from(report.load()) * 1_000;

        assert!(deadline.min >= busy_ns * 999 / 1000);
        assert!(period.count >= 1);
        assert!(period.min >= 39 * MS);
        assert!(hiccup.count > 0);
        assert!(report.metrics_before().resident_bytes.is_some() || !cfg!(target_os = "linux"));
        assert!(!report.metrics_comparison().is_empty());
    }
}

#[test]
fn test_continuous_task_runs_back_to_back() {
    let mut engine = MeasurementEngine::new(
        TaskSpec::continuous(),
        SpinLoad,
        NullMetrics,
        quick_config(1, Duration::from_millis(50)),
    )
    .unwrap();

    let report = engine.run_iteration(10, Duration::from_millis(50)).unwrap();
    let [deadline, period, _] = summarize(&report);

    // 10 µs per pass leaves room for thousands of passes in 50 ms
    assert!(deadline.count > 100, "passes: {}", deadline.count);
    assert_eq!(period.count, deadline.count - 1);
    assert!(period.p50 < MS);
}

#[test]
fn test_overloaded_task_backfills_period() {
    // Workload takes 30 ms against a 10 ms period
    let task = TaskSpec::new(10 * MS, 5 * MS, 30_000);
    let mut engine = MeasurementEngine::new(
        task,
        SpinLoad,
        NullMetrics,
        quick_config(1, Duration::from_millis(150)),
    )
    .unwrap();

    let report = engine.run_iteration(30_000, Duration::from_millis(150)).unwrap();
    let [deadline, period, _] = summarize(&report);

    // At least three passes of about 30 ms each. Every raw deadline sample
    // carries five backfilled ones at 5 ms spacing, every period sample two.
    assert!(deadline.count >= 18, "deadline samples: {}", deadline.count);
    assert!(period.count >= 6, "period samples: {}", period.count);
    assert!(deadline.max >= 29 * MS);
    assert!(deadline.min < 10 * MS);
}

#[test]
fn test_configuration_errors_before_timing() {
    // 2048 << 5 exceeds the random-memory limit
    let result = MeasurementEngine::new(
        TaskSpec::new(40 * MS, 10 * MS, 2048),
        RandomMemoryLoad::new(),
        NullMetrics,
        quick_config(6, Duration::from_millis(10)),
    );
    assert!(result.err().is_some_and(|e| e.is_configuration()));
}

/// Full fast preset with the default workload and a realistic runtime.
#[test]
#[ignore = "Runs for about two minutes"]
fn test_fast_preset_soak() {
    let mut engine = MeasurementEngine::new(
        TaskSpec::fast(),
        RandomMemoryLoad::new(),
        ProcessMetrics::new(),
        quick_config(8, Duration::from_secs(15)),
    )
    .unwrap();

    let mut reports = Vec::new();
    let summary = engine.run(&mut reports).unwrap();
    assert_eq!(summary.loads.len(), 8);

    for report in &reports {
        print_report(report);
        let [_, period, _] = summarize(report);
        assert!(period.count > 300);
    }
}
