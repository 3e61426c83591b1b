//! Warmup/measure replay of the load progression.

use super::common::{quick_config, RecordingWorkload, MS};
use bench_common::config::TaskSpec;
use bench_common::state::EngineState;
use bench_core::engine::MeasurementEngine;
use bench_core::load_sequence::LoadSequence;
use bench_core::report::IterationReport;
use bench_core::system_metrics::NullMetrics;
use std::time::Duration;

fn engine(iterations: u32) -> MeasurementEngine<RecordingWorkload, NullMetrics> {
    MeasurementEngine::new(
        TaskSpec::new(5 * MS, 5 * MS, 3),
        RecordingWorkload::default(),
        NullMetrics,
        quick_config(iterations, Duration::from_millis(15)),
    )
    .unwrap()
}

#[test]
fn test_warmup_precedes_measured_loads() {
    let mut engine = engine(3);
    let mut reports: Vec<IterationReport> = Vec::new();
    engine.run(&mut reports).unwrap();

    let loads = &engine.workload().loads;
    let first_measured = loads.iter().position(|&l| l == 3).unwrap();
    assert!(loads[..first_measured].iter().all(|&l| l <= 1));
    assert!(loads[..first_measured].contains(&1));
    assert!(loads[..first_measured].contains(&0));

    let measured: Vec<u32> = reports.iter().map(IterationReport::load).collect();
    assert_eq!(measured, vec![3, 6, 12]);
}

#[test]
fn test_rerun_replays_identical_progression() {
    let mut engine = engine(4);
    let expected: Vec<u32> = LoadSequence::new(3, 4).unwrap().collect();

    for _ in 0..2 {
        let mut reports: Vec<IterationReport> = Vec::new();
        let summary = engine.run(&mut reports).unwrap();
        assert_eq!(summary.loads, expected);
        assert_eq!(engine.state(), EngineState::Done);
    }
}
