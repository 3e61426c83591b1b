//! Measurement engine lifecycle.
//!
//! A full run walks IDLE → WARMING → CLEANUP → MEASURING → DONE.
//! A finished engine may be run again (DONE → WARMING) and replays the
//! same load progression. Any failure mid-run lands in FAILED, which is
//! terminal: a run is never resumed with partial data.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lifecycle states of a measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Constructed and validated; nothing measured yet.
    #[default]
    Idle,
    /// Driving the environment to steady state.
    Warming,
    /// Advisory reclamation between warmup and measurement.
    Cleanup,
    /// Measuring one iteration per load value.
    Measuring,
    /// Every load value has been reported.
    Done,
    /// The run aborted.
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Warming => write!(f, "WARMING"),
            Self::Cleanup => write!(f, "CLEANUP"),
            Self::Measuring => write!(f, "MEASURING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl EngineState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        use EngineState::{Cleanup, Done, Failed, Idle, Measuring, Warming};

        matches!(
            (self, target),
            (Idle, Warming)
                | (Warming, Cleanup)
                | (Cleanup, Measuring)
                | (Measuring, Done)
                // Re-run replays the identical progression
                | (Done, Warming)
                | (Warming, Failed)
                | (Cleanup, Failed)
                | (Measuring, Failed)
        )
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Warming | Self::Cleanup | Self::Measuring)
    }
}

/// State machine wrapper counting transitions.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: EngineState,
    transition_count: u64,
}

impl StateMachine {
    /// Create a new state machine starting in IDLE.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.current
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidStateTransition`] if the move is not allowed.
    pub fn transition(&mut self, target: EngineState) -> BenchResult<()> {
        if !self.current.can_transition_to(target) {
            return Err(BenchError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }
        debug!(from = %self.current, to = %target, "Engine state transition");
        self.current = target;
        self.transition_count += 1;
        Ok(())
    }

    /// Mark the run as failed if one is in progress.
    pub fn enter_failed(&mut self) {
        if self.current.is_running() {
            debug!(from = %self.current, "Engine run failed");
            self.current = EngineState::Failed;
            self.transition_count += 1;
        }
    }
}
