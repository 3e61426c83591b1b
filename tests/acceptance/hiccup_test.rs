//! Hiccup sampler lifecycle.

use super::common::MS;
use bench_common::config::{RealtimeConfig, RecorderConfig};
use bench_core::hiccup::HiccupSampler;
use bench_core::realtime::prepare_measurement_thread;
use bench_core::report::HistogramSummary;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_start_then_terminate_is_prompt() {
    let started = Instant::now();
    let sampler = HiccupSampler::start(Duration::from_millis(1), &RecorderConfig::default()).unwrap();
    let histogram = sampler.terminate().unwrap();

    assert!(histogram.len() < 50, "samples: {}", histogram.len());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_samples_track_wall_clock() {
    let sampler = HiccupSampler::start(Duration::from_millis(1), &RecorderConfig::default()).unwrap();
    thread::sleep(Duration::from_millis(100));
    let summary = HistogramSummary::from_histogram(&sampler.terminate().unwrap());

    // Backfill keeps the sample count proportional to elapsed time
    assert!(summary.count >= 20, "samples: {}", summary.count);
    assert!(summary.count <= 150, "samples: {}", summary.count);
    assert!(summary.min >= MS * 999 / 1000);
}

#[test]
fn test_independent_of_busy_thread() {
    let sampler = HiccupSampler::start(Duration::from_millis(1), &RecorderConfig::default()).unwrap();

    let spin_until = Instant::now() + Duration::from_millis(50);
    while Instant::now() < spin_until {
        std::hint::spin_loop();
    }

    let histogram = sampler.terminate().unwrap();
    assert!(histogram.len() >= 10);
}

#[test]
fn test_sampler_runs_beside_pinned_fifo_spinner() {
    let config = RealtimeConfig {
        enabled: true,
        cpu: Some(0),
        fifo_priority: Some(50),
        ..Default::default()
    };

    // Prepared settings stay on this helper, not the test harness thread
    let histogram = thread::spawn(move || {
        let status = prepare_measurement_thread(&config).unwrap();
        println!("realtime status: {status:?}");

        let sampler =
            HiccupSampler::start(Duration::from_millis(1), &RecorderConfig::default()).unwrap();
        let spin_until = Instant::now() + Duration::from_millis(300);
        while Instant::now() < spin_until {
            std::hint::spin_loop();
        }
        sampler.terminate().unwrap()
    })
    .join()
    .unwrap();

    let summary = HistogramSummary::from_histogram(&histogram);
    println!("hiccup beside spinner: {summary:?}");

    // Even a fully starved sampler records the stall once it runs again
    assert!(summary.count > 0);
    assert!(summary.max >= 300 * MS * 99 / 100 || summary.count >= 100);

    let cpus = thread::available_parallelism().map_or(1, usize::from);
    if cpus > 1 {
        assert!(summary.count >= 100, "samples: {}", summary.count);
    }
}
