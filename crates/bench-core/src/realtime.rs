//! Real-time preparation of the measurement thread.
//!
//! Optional and best-effort:
//! - Memory locking (mlockall) so the timed loop takes no major faults
//! - CPU pinning to keep the loop on one core
//! - SCHED_FIFO so ordinary processes cannot preempt the loop
//!
//! Missing privileges only produce a warning; the benchmark still runs, with
//! the degradation visible in the hiccup histogram.

use bench_common::config::RealtimeConfig;
use bench_common::error::{BenchError, BenchResult};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What [`prepare_measurement_thread`] actually applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RealtimeStatus {
    /// Whether memory was locked.
    pub memory_locked: bool,
    /// CPU the thread is pinned to.
    pub cpu: Option<usize>,
    /// SCHED_FIFO priority in effect.
    pub fifo_priority: Option<u8>,
}

/// Apply the real-time settings to the calling thread.
///
/// Call from the thread that will run the engine, before the run starts.
///
/// # Errors
///
/// Returns [`BenchError::Config`] for an invalid CPU index or when a
/// system call fails for a reason other than missing privileges.
pub fn prepare_measurement_thread(config: &RealtimeConfig) -> BenchResult<RealtimeStatus> {
    if !config.enabled {
        debug!("Real-time preparation disabled");
        return Ok(RealtimeStatus::default());
    }

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };

    let cpu = match config.cpu {
        Some(cpu) => pin_to_cpu(cpu)?,
        None => None,
    };

    let fifo_priority = match config.fifo_priority {
        Some(priority) => set_fifo(priority)?,
        None => None,
    };

    let status = RealtimeStatus {
        memory_locked,
        cpu,
        fifo_priority,
    };
    info!(?status, "Measurement thread prepared");
    Ok(status)
}

#[cfg(target_os = "linux")]
fn lock_memory() -> BenchResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            debug!("Memory locked");
            Ok(true)
        }
        Err(nix::errno::Errno::EPERM | nix::errno::Errno::ENOMEM) => {
            warn!("mlockall not permitted (needs CAP_IPC_LOCK or a higher RLIMIT_MEMLOCK); continuing unlocked");
            Ok(false)
        }
        Err(e) => Err(BenchError::Config(format!("mlockall failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> BenchResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) -> BenchResult<Option<usize>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpu_set = CpuSet::new();
    cpu_set
        .set(cpu)
        .map_err(|e| BenchError::Config(format!("invalid CPU index {cpu}: {e}")))?;

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            debug!(cpu, "Pinned measurement thread");
            Ok(Some(cpu))
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(cpu, "CPU not available; measurement thread left unpinned");
            Ok(None)
        }
        Err(e) => Err(BenchError::Config(format!("sched_setaffinity failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(cpu: usize) -> BenchResult<Option<usize>> {
    warn!(cpu, "CPU pinning not available on this platform");
    Ok(None)
}

#[cfg(target_os = "linux")]
fn set_fifo(priority: u8) -> BenchResult<Option<u8>> {
    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(requested = priority, clamped, "SCHED_FIFO priority clamped");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread; `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!("SCHED_FIFO not permitted (needs CAP_SYS_NICE); staying on the default scheduler");
            return Ok(None);
        }
        return Err(BenchError::Config(format!("sched_setscheduler failed: {err}")));
    }

    debug!(priority = clamped, "SCHED_FIFO enabled");
    Ok(Some(clamped))
}

#[cfg(not(target_os = "linux"))]
fn set_fifo(priority: u8) -> BenchResult<Option<u8>> {
    warn!(priority, "SCHED_FIFO not available on this platform");
    Ok(None)
}

/// Drop inherited real-time placement on a helper thread.
///
/// Threads inherit the policy and CPU mask of their creator. A helper spawned
/// from a prepared measurement thread would otherwise share its pinned core at
/// the same FIFO priority and never run while the timed loop spins. Moves the
/// calling thread back to SCHED_OTHER and allows every CPU. Best-effort.
#[cfg(target_os = "linux")]
pub fn release_helper_thread() {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let param = libc::sched_param { sched_priority: 0 };
    // SAFETY: pid 0 targets the calling thread; `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_OTHER, &param) };
    if result == -1 {
        debug!(
            error = %std::io::Error::last_os_error(),
            "Helper thread kept its inherited scheduler"
        );
    }

    let mut all = CpuSet::new();
    for cpu in 0..CpuSet::count() {
        // Indices below count() are always accepted
        let _ = all.set(cpu);
    }
    if let Err(e) = sched_setaffinity(Pid::from_raw(0), &all) {
        debug!(error = %e, "Helper thread kept its inherited CPU mask");
    }
}

/// Drop inherited real-time placement on a helper thread (no-op on this platform).
#[cfg(not(target_os = "linux"))]
pub fn release_helper_thread() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_noop() {
        let status = prepare_measurement_thread(&RealtimeConfig::default()).unwrap();
        assert_eq!(status, RealtimeStatus::default());
    }

    #[test]
    fn test_enabled_without_settings() {
        let config = RealtimeConfig {
            enabled: true,
            ..Default::default()
        };
        let status = prepare_measurement_thread(&config).unwrap();
        assert!(!status.memory_locked);
        assert_eq!(status.cpu, None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_out_of_range_cpu_is_config_error() {
        let config = RealtimeConfig {
            enabled: true,
            cpu: Some(1 << 20),
            ..Default::default()
        };
        let err = prepare_measurement_thread(&config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_helper_thread_leaves_pinned_cpu() {
        use nix::sched::{sched_getaffinity, CpuSet};
        use nix::unistd::Pid;

        let allowed = |set: &CpuSet| {
            (0..CpuSet::count())
                .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
                .count()
        };

        std::thread::spawn(move || {
            let before = allowed(&sched_getaffinity(Pid::from_raw(0)).unwrap());
            if pin_to_cpu(0).unwrap().is_none() {
                // CPU 0 outside this process's cpuset
                return;
            }
            assert_eq!(allowed(&sched_getaffinity(Pid::from_raw(0)).unwrap()), 1);

            release_helper_thread();

            let after = allowed(&sched_getaffinity(Pid::from_raw(0)).unwrap());
            assert!(after >= before, "allowed CPUs {after} < {before}");
            // SAFETY: querying the calling thread's policy has no preconditions.
            let policy = unsafe { libc::sched_getscheduler(0) };
            assert_eq!(policy, libc::SCHED_OTHER);
        })
        .join()
        .unwrap();
    }
}
