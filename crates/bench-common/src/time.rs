//! Monotonic time helpers shared by the measurement loop and the hiccup sampler.

use std::time::{Duration, Instant};

/// Monotonic nanosecond clock anchored at its creation instant.
///
/// Timestamps are plain `u64` nanoseconds so the measurement loop can do
/// arithmetic on them without constructing `Duration` values.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

impl MonotonicClock {
    /// Start a clock at the current instant.
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the clock was started.
    #[inline]
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        duration_to_ns(self.origin.elapsed())
    }
}

/// Convert a duration to nanoseconds, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::start();
        let a = clock.now_ns();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now_ns();
        assert!(b >= a + 2_000_000);
    }

    #[test]
    fn test_duration_to_ns_saturates() {
        assert_eq!(duration_to_ns(Duration::from_millis(40)), 40_000_000);
        assert_eq!(duration_to_ns(Duration::MAX), u64::MAX);
    }
}
