//! Configuration structures for benchmark runs.
//!
//! A run is described by two independent pieces:
//!
//! - a [`TaskSpec`], the real-time constraints of the measured task, picked
//!   by name from a [`CaseFile`] (or one of the built-in presets), and
//! - a [`RunConfig`], the run-level knobs (iteration count, runtimes,
//!   recorder precision, real-time thread preparation).
//!
//! Both deserialize from TOML. Durations in the run configuration use the
//! humantime format (`"900s"`, `"1ms"`); task fields stay in raw nanoseconds.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Real-time constraints of the measured task.
///
/// A `period_ns` of zero denotes a continuous task: the workload runs
/// back-to-back with no period bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    /// Target time between the start of consecutive iterations.
    pub period_ns: u64,
    /// Maximum allowed duration of one iteration.
    pub deadline_ns: u64,
    /// Load of the first measured iteration.
    pub initial_load: u32,
}

impl TaskSpec {
    /// Create a task from its three constraints.
    #[must_use]
    pub const fn new(period_ns: u64, deadline_ns: u64, initial_load: u32) -> Self {
        Self {
            period_ns,
            deadline_ns,
            initial_load,
        }
    }

    /// A continuous task that should get as fast a response as possible.
    #[must_use]
    pub const fn continuous() -> Self {
        Self::new(0, 0, 1)
    }

    /// A 25 Hz cycle: 40 ms period, 10 ms deadline, initial load 16.
    #[must_use]
    pub const fn fast() -> Self {
        Self::new(40_000_000, 10_000_000, 16)
    }

    /// A 1.2 s cycle with a 0.7 s deadline and an initial load of 1024.
    #[must_use]
    pub const fn slow() -> Self {
        Self::new(1_200_000_000, 700_000_000, 1024)
    }

    /// Returns true if the task has no period bound.
    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        self.period_ns == 0
    }

    /// Period as a `Duration`.
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    /// Deadline as a `Duration`.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_nanos(self.deadline_ns)
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_continuous() {
            write!(f, "[Period: continuous, ")?;
        } else {
            write!(f, "[Period: {}, ", humantime::format_duration(self.period()))?;
        }
        write!(
            f,
            "Deadline: {}, Initial load: {}]",
            humantime::format_duration(self.deadline()),
            self.initial_load
        )
    }
}

/// Named task definitions, as read from a TOML case file.
///
/// ```toml
/// [tasks.fast]
/// period_ns = 40000000
/// deadline_ns = 10000000
/// initial_load = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFile {
    /// Tasks keyed by name.
    pub tasks: BTreeMap<String, TaskSpec>,
}

impl CaseFile {
    /// The built-in cases: `continuous`, `fast` and `slow`.
    #[must_use]
    pub fn builtin() -> Self {
        let tasks = [
            ("continuous", TaskSpec::continuous()),
            ("fast", TaskSpec::fast()),
            ("slow", TaskSpec::slow()),
        ]
        .into_iter()
        .map(|(name, task)| (name.to_string(), task))
        .collect();
        Self { tasks }
    }

    /// Load a case file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a case file from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a task is missing a field.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Look up a task by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownTask`] listing the available names.
    pub fn task(&self, name: &str) -> Result<TaskSpec, ConfigError> {
        self.tasks
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownTask {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Iterate over task names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}

/// Run-level configuration: how long and how often to measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of measured iterations, one per load value.
    pub iterations: u32,

    /// Wall-clock runtime of each measured iteration.
    #[serde(with = "humantime_serde")]
    pub iteration_runtime: Duration,

    /// Runtime of the warmup iteration.
    #[serde(with = "humantime_serde")]
    pub warmup_runtime: Duration,

    /// Sleep interval of the hiccup sampler.
    #[serde(with = "humantime_serde")]
    pub hiccup_interval: Duration,

    /// Histogram precision for all recorders.
    pub recorder: RecorderConfig,

    /// Real-time preparation of the measurement thread.
    pub realtime: RealtimeConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 8,
            iteration_runtime: Duration::from_secs(900),
            warmup_runtime: Duration::from_secs(10),
            hiccup_interval: Duration::from_millis(1),
            recorder: RecorderConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load a run configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a run configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize the run configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check the run-level parameters before anything is measured.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] describing the first invalid field.
    pub fn validate(&self) -> BenchResult<()> {
        if self.iterations == 0 {
            return Err(BenchError::Config(
                "at least one iteration is required".into(),
            ));
        }
        if self.iteration_runtime.is_zero() {
            return Err(BenchError::Config(
                "iteration runtime must be positive".into(),
            ));
        }
        if self.warmup_runtime.is_zero() {
            return Err(BenchError::Config("warmup runtime must be positive".into()));
        }
        if self.hiccup_interval.is_zero() {
            return Err(BenchError::Config(
                "hiccup sampling interval must be positive".into(),
            ));
        }
        if self.planned_duration().is_none() {
            return Err(BenchError::Config(format!(
                "{} iterations of {} do not fit in a single run",
                self.iterations,
                humantime::format_duration(self.iteration_runtime)
            )));
        }
        self.recorder.validate()
    }

    /// Wall-clock time of a full run: two warmup passes plus every iteration.
    ///
    /// Returns `None` if the total overflows a `Duration`.
    #[must_use]
    pub fn planned_duration(&self) -> Option<Duration> {
        self.warmup_runtime
            .checked_mul(2)?
            .checked_add(self.iteration_runtime.checked_mul(self.iterations)?)
    }
}

/// Precision and range of the latency histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Largest value a histogram can hold; larger samples are clamped.
    #[serde(with = "humantime_serde")]
    pub highest_trackable: Duration,

    /// Number of significant decimal digits kept per value (1-5).
    pub significant_digits: u8,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            highest_trackable: Duration::from_secs(3600),
            significant_digits: 3,
        }
    }
}

impl RecorderConfig {
    /// Largest trackable value in nanoseconds.
    #[must_use]
    pub fn highest_trackable_ns(&self) -> u64 {
        crate::time::duration_to_ns(self.highest_trackable)
    }

    /// Check the histogram bounds.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if the range or precision is unusable.
    pub fn validate(&self) -> BenchResult<()> {
        if !(1..=5).contains(&self.significant_digits) {
            return Err(BenchError::Config(format!(
                "significant digits must be between 1 and 5, got {}",
                self.significant_digits
            )));
        }
        if self.highest_trackable_ns() < 2 {
            return Err(BenchError::Config(
                "highest trackable value must be at least 2ns".into(),
            ));
        }
        Ok(())
    }
}

/// Real-time preparation of the measurement thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Apply any of the settings below.
    pub enabled: bool,

    /// Lock all current and future pages (mlockall).
    pub lock_memory: bool,

    /// Pin the measurement thread to this CPU.
    pub cpu: Option<usize>,

    /// Run the measurement thread under SCHED_FIFO with this priority (1-99).
    pub fifo_priority: Option<u8>,
}

/// Configuration-file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No task with the requested name.
    #[error("no task named {name} (available: {available})")]
    UnknownTask {
        /// Requested task name.
        name: String,
        /// Comma-separated list of known task names.
        available: String,
    },
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
