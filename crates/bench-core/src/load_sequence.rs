//! Doubling load progression.
//!
//! A sequence of `length` loads starting at `base`: `base, 2·base, 4·base, …`.
//! Creation fails if the last value would not fit in a `u32`, so `next_load`
//! never has to check for overflow.

use bench_common::config::TaskSpec;
use bench_common::error::{BenchError, BenchResult};

/// Deterministic doubling sequence of load values.
///
/// Not meant for concurrent use; each run takes its own
/// [`clone_fresh`](Self::clone_fresh) copy of a prototype sequence.
#[derive(Debug, PartialEq, Eq)]
pub struct LoadSequence {
    base: u32,
    length: u32,
    cursor: u32,
}

impl LoadSequence {
    /// Create a sequence of `length` values starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if `base < 1`, `length < 1`, or if
    /// `base << (length - 1)` would overflow a `u32`.
    pub fn new(base: u32, length: u32) -> BenchResult<Self> {
        if base < 1 {
            return Err(BenchError::Config(
                "cannot start a load sequence below 1".into(),
            ));
        }
        if length < 1 {
            return Err(BenchError::Config(
                "a load sequence needs at least 1 value".into(),
            ));
        }
        let shift = length - 1;
        if base.leading_zeros() < shift {
            return Err(BenchError::Config(format!(
                "cannot double a base load of {base} {shift} times: ceiling is {} doublings",
                base.leading_zeros()
            )));
        }
        Ok(Self {
            base,
            length,
            cursor: 0,
        })
    }

    /// Sequence for a task: starts at its initial load and doubles `iterations - 1` times.
    ///
    /// # Errors
    ///
    /// See [`LoadSequence::new`].
    pub fn for_task(task: &TaskSpec, iterations: u32) -> BenchResult<Self> {
        Self::new(task.initial_load, iterations)
    }

    /// Produce the next load value.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::SequenceExhausted`] once `length` values have
    /// been produced. The cursor does not move past the end.
    pub fn next_load(&mut self) -> BenchResult<u32> {
        if self.cursor >= self.length {
            return Err(BenchError::SequenceExhausted {
                length: self.length,
            });
        }
        let load = self.base << self.cursor;
        self.cursor += 1;
        Ok(load)
    }

    /// A new sequence with the same parameters and the cursor at zero.
    #[must_use]
    pub fn clone_fresh(&self) -> Self {
        Self {
            base: self.base,
            length: self.length,
            cursor: 0,
        }
    }

    /// First value of the sequence.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Total number of values the sequence produces.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Largest value the sequence produces.
    #[must_use]
    pub fn peak(&self) -> u32 {
        self.base << (self.length - 1)
    }

    /// Number of values left.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.length - self.cursor
    }

    /// Returns true once every value has been produced.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.length
    }
}

impl Iterator for LoadSequence {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.next_load().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LoadSequence {}
