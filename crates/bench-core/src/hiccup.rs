//! Background hiccup sampler.
//!
//! A dedicated thread sleeps for a fixed interval `S`, wakes, and records
//! how long it actually slept. Any excess over `S` is a pause imposed by
//! the scheduler or the runtime, independent of the measured workload.
//! Samples use coordinated-omission correction with `expected = S`.

use crate::realtime::release_helper_thread;
use crate::recorder::{Harvester, IntervalRecorder};
use bench_common::config::RecorderConfig;
use bench_common::error::{BenchError, BenchResult};
use bench_common::time::{duration_to_ns, MonotonicClock};
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Running hiccup sampler. Stop it with [`terminate`](Self::terminate).
#[derive(Debug)]
pub struct HiccupSampler {
    stop_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    harvester: Harvester,
    interval: Duration,
}

impl HiccupSampler {
    /// Spawn the sampling thread.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] for a zero interval or invalid recorder
    /// bounds, and [`BenchError::Resource`] if the thread cannot be spawned.
    pub fn start(interval: Duration, recorder: &RecorderConfig) -> BenchResult<Self> {
        if interval.is_zero() {
            return Err(BenchError::Config(
                "hiccup sampling interval must be positive".into(),
            ));
        }

        let mut recorder = IntervalRecorder::new(recorder)?;
        let harvester = recorder.harvester();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_requested);
        let interval_ns = duration_to_ns(interval);

        let handle = thread::Builder::new()
            .name("rtbench-hiccup".into())
            .spawn(move || {
                release_helper_thread();
                let clock = MonotonicClock::start();
                let mut last_wake = clock.now_ns();

                loop {
                    thread::sleep(interval);
                    // The final sleep is recorded too: a stall still in
                    // progress at terminate() must reach the histogram.
                    let now = clock.now_ns();
                    recorder.record(now.saturating_sub(last_wake), interval_ns);
                    last_wake = now;
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                }
            })
            .map_err(|e| BenchError::Resource(format!("failed to spawn hiccup sampler: {e}")))?;

        debug!(interval_us = interval.as_micros(), "Hiccup sampler started");

        Ok(Self {
            stop_requested,
            handle: Some(handle),
            harvester,
            interval,
        })
    }

    /// Sampling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop sampling and return every sample taken since [`start`](Self::start).
    ///
    /// Blocks for at most one sampling interval while the thread wakes up.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Resource`] if the sampling thread panicked.
    pub fn terminate(mut self) -> BenchResult<Histogram<u64>> {
        self.stop_and_join()?;
        let histogram = self.harvester.harvest();
        debug!(samples = histogram.len(), "Hiccup sampler terminated");
        Ok(histogram)
    }

    fn stop_and_join(&mut self) -> BenchResult<()> {
        self.stop_requested.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| BenchError::Resource("hiccup sampler thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for HiccupSampler {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!("Dropping hiccup sampler: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_start_then_terminate() {
        let interval = Duration::from_millis(1);
        let sampler = HiccupSampler::start(interval, &RecorderConfig::default()).unwrap();

        let begin = Instant::now();
        let hist = sampler.terminate().unwrap();

        // One interval plus generous scheduling slack
        assert!(begin.elapsed() < Duration::from_millis(250));
        assert!(hist.len() < 100);
    }

    #[test]
    fn test_samples_cover_runtime() {
        let interval = Duration::from_millis(1);
        let sampler = HiccupSampler::start(interval, &RecorderConfig::default()).unwrap();
        thread::sleep(Duration::from_millis(50));
        let hist = sampler.terminate().unwrap();

        // Each sample is at least one interval, corrected samples fill stalls
        assert!(hist.len() >= 5);
        assert!(hist.min() >= hist.lowest_equivalent(1_000_000));
    }

    #[test]
    fn test_sleep_in_progress_at_terminate_is_recorded() {
        let interval = Duration::from_millis(200);
        let sampler = HiccupSampler::start(interval, &RecorderConfig::default()).unwrap();
        let hist = sampler.terminate().unwrap();

        assert!(!hist.is_empty());
        assert!(hist.max() >= hist.lowest_equivalent(200_000_000));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = HiccupSampler::start(Duration::ZERO, &RecorderConfig::default());
        assert!(matches!(result, Err(BenchError::Config(_))));
    }

    #[test]
    fn test_drop_stops_thread() {
        let sampler =
            HiccupSampler::start(Duration::from_millis(1), &RecorderConfig::default()).unwrap();
        assert_eq!(sampler.interval(), Duration::from_millis(1));
        drop(sampler);
    }
}
