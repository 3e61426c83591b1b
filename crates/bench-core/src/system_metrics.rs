//! Process-level counters captured before and after each iteration.
//!
//! The engine treats a [`SystemSnapshot`] as opaque: it takes one before
//! and one after every measured iteration and hands both to the report.
//! Rendering and comparison belong to the [`SystemMetrics`] implementation.
//!
//! Counters that a platform cannot provide stay `None` rather than being
//! reported as zero.

use serde::Serialize;
use std::fmt::Write as _;

/// Point-in-time process counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    /// Resident set size in bytes.
    pub resident_bytes: Option<u64>,
    /// Peak resident set size in bytes.
    pub peak_resident_bytes: Option<u64>,
    /// Page faults serviced without I/O.
    pub minor_faults: Option<u64>,
    /// Page faults that required I/O.
    pub major_faults: Option<u64>,
    /// Context switches caused by blocking.
    pub voluntary_switches: Option<u64>,
    /// Context switches caused by preemption.
    pub involuntary_switches: Option<u64>,
    /// Number of threads in the process.
    pub threads: Option<u64>,
}

impl SystemSnapshot {
    /// Counters in display order, labelled.
    #[must_use]
    pub fn counters(&self) -> [(&'static str, Option<u64>); 7] {
        [
            ("Resident memory (bytes)", self.resident_bytes),
            ("Peak resident memory (bytes)", self.peak_resident_bytes),
            ("Minor page faults", self.minor_faults),
            ("Major page faults", self.major_faults),
            ("Voluntary context switches", self.voluntary_switches),
            ("Involuntary context switches", self.involuntary_switches),
            ("Threads", self.threads),
        ]
    }
}

/// Source of system counters.
pub trait SystemMetrics {
    /// Capture the current counters.
    fn snapshot(&self) -> SystemSnapshot;

    /// Human-readable listing of one snapshot.
    fn describe(&self, snapshot: &SystemSnapshot) -> String {
        let mut out = String::new();
        for (label, value) in snapshot.counters() {
            match value {
                Some(v) => {
                    let _ = writeln!(out, "{label}: {v}");
                }
                None => {
                    let _ = writeln!(out, "{label}: n/a");
                }
            }
        }
        out
    }

    /// Human-readable comparison, one `diff (after/before)` line per counter.
    fn diff(&self, before: &SystemSnapshot, after: &SystemSnapshot) -> String {
        let mut out = String::new();
        for ((label, b), (_, a)) in before.counters().into_iter().zip(after.counters()) {
            match (b, a) {
                (Some(b), Some(a)) => {
                    let delta = i128::from(a) - i128::from(b);
                    let _ = writeln!(out, "{label}: {delta:+} ({a}/{b})");
                }
                _ => {
                    let _ = writeln!(out, "{label}: n/a");
                }
            }
        }
        out
    }

    /// Ask the host to release deferred resources before measuring.
    ///
    /// Advisory; callers must not rely on it having any effect.
    fn request_reclamation(&self) {}
}

impl<M: SystemMetrics + ?Sized> SystemMetrics for Box<M> {
    fn snapshot(&self) -> SystemSnapshot {
        (**self).snapshot()
    }

    fn describe(&self, snapshot: &SystemSnapshot) -> String {
        (**self).describe(snapshot)
    }

    fn diff(&self, before: &SystemSnapshot, after: &SystemSnapshot) -> String {
        (**self).diff(before, after)
    }

    fn request_reclamation(&self) {
        (**self).request_reclamation();
    }
}

/// Counters of the current process from `getrusage` and `/proc/self/status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMetrics;

impl ProcessMetrics {
    /// Create a process metrics source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SystemMetrics for ProcessMetrics {
    fn snapshot(&self) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::default();
        fill_from_rusage(&mut snapshot);
        fill_from_proc_status(&mut snapshot);
        snapshot
    }

    fn request_reclamation(&self) {
        trim_heap();
    }
}

/// Metrics source for platforms without any counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl SystemMetrics for NullMetrics {
    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::default()
    }
}

#[cfg(unix)]
fn fill_from_rusage(snapshot: &mut SystemSnapshot) {
    // SAFETY: `rusage` is plain old data; getrusage fully initializes it on success.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // SAFETY: valid pointer to a local rusage.
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
        return;
    }

    let counter = |v: libc::c_long| u64::try_from(v).ok();
    snapshot.minor_faults = counter(usage.ru_minflt);
    snapshot.major_faults = counter(usage.ru_majflt);
    snapshot.voluntary_switches = counter(usage.ru_nvcsw);
    snapshot.involuntary_switches = counter(usage.ru_nivcsw);

    // ru_maxrss is in kilobytes on Linux and bytes on macOS
    let max_rss = counter(usage.ru_maxrss);
    snapshot.peak_resident_bytes = if cfg!(target_os = "macos") {
        max_rss
    } else {
        max_rss.map(|kb| kb.saturating_mul(1024))
    };
}

#[cfg(not(unix))]
fn fill_from_rusage(_snapshot: &mut SystemSnapshot) {}

#[cfg(target_os = "linux")]
fn fill_from_proc_status(snapshot: &mut SystemSnapshot) {
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        apply_proc_status(snapshot, &status);
    }
}

#[cfg(not(target_os = "linux"))]
fn fill_from_proc_status(_snapshot: &mut SystemSnapshot) {}

/// Apply `VmRSS`, `VmHWM` and `Threads` lines from a `/proc/<pid>/status` dump.
fn apply_proc_status(snapshot: &mut SystemSnapshot, status: &str) {
    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let mut fields = value.split_whitespace();
        let Some(number) = fields.next().and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };
        let bytes = match fields.next() {
            Some("kB") => number.saturating_mul(1024),
            _ => number,
        };
        match key {
            "VmRSS" => snapshot.resident_bytes = Some(bytes),
            "VmHWM" => snapshot.peak_resident_bytes = Some(bytes),
            "Threads" => snapshot.threads = Some(number),
            _ => {}
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_heap() {
    // SAFETY: malloc_trim only returns free heap pages to the OS.
    let released = unsafe { libc::malloc_trim(0) };
    tracing::debug!(released = released != 0, "Requested heap trim");
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_heap() {
    tracing::debug!("Heap trimming not available on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\trtbench\n\
                          VmHWM:\t    8192 kB\n\
                          VmRSS:\t    4096 kB\n\
                          Threads:\t3\n\
                          SigQ:\t0/63413\n";

    #[test]
    fn test_parse_proc_status() {
        let mut snapshot = SystemSnapshot::default();
        apply_proc_status(&mut snapshot, STATUS);
        assert_eq!(snapshot.resident_bytes, Some(4096 * 1024));
        assert_eq!(snapshot.peak_resident_bytes, Some(8192 * 1024));
        assert_eq!(snapshot.threads, Some(3));
        assert_eq!(snapshot.minor_faults, None);
    }

    #[test]
    fn test_null_metrics_reports_nothing() {
        let metrics = NullMetrics;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot, SystemSnapshot::default());
        assert!(metrics.describe(&snapshot).contains("Threads: n/a"));
    }

    #[test]
    fn test_diff_format() {
        let before = SystemSnapshot {
            minor_faults: Some(100),
            threads: Some(2),
            ..Default::default()
        };
        let after = SystemSnapshot {
            minor_faults: Some(160),
            threads: Some(1),
            ..Default::default()
        };

        let diff = NullMetrics.diff(&before, &after);
        assert!(diff.contains("Minor page faults: +60 (160/100)"));
        assert!(diff.contains("Threads: -1 (1/2)"));
        assert!(diff.contains("Major page faults: n/a"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_on_linux() {
        let metrics = ProcessMetrics::new();
        let snapshot = metrics.snapshot();
        assert!(snapshot.resident_bytes.is_some_and(|rss| rss > 0));
        assert!(snapshot.threads.is_some_and(|t| t >= 1));
        assert!(snapshot.minor_faults.is_some());
        metrics.request_reclamation();
    }
}
