//! End-to-end tests of the measurement engine.

mod common;
mod engine_test;
mod hiccup_test;
mod replay_test;
