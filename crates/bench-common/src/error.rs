use thiserror::Error;

/// Benchmark error types covering configuration, sequencing, and resource failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BenchError {
    /// Invalid configuration detected before any measurement began.
    #[error("configuration error: {0}")]
    Config(String),

    /// A load sequence was asked for a value past its length.
    #[error("load sequence exhausted after {length} values")]
    SequenceExhausted {
        /// Number of values the sequence produces.
        length: u32,
    },

    /// An execution unit or output sink could not be acquired.
    #[error("resource error: {0}")]
    Resource(String),

    /// The workload failed while being measured.
    #[error("workload failure: {0}")]
    Workload(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl BenchError {
    /// Returns true for errors that are raised before any timing side effects.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Convenience type alias for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BenchError::SequenceExhausted { length: 4 };
        assert_eq!(err.to_string(), "load sequence exhausted after 4 values");

        let err = BenchError::Config("base load must be at least 1".into());
        assert!(err.to_string().starts_with("configuration error"));
        assert!(err.is_configuration());
        assert!(!BenchError::Resource("spawn".into()).is_configuration());
    }
}
