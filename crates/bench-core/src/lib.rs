#![doc = "Measurement engine for rtbench: load progression, coordinated-omission-corrected recorders, hiccup sampling and the period/deadline timing loop."]

pub mod engine;
pub mod hiccup;
pub mod load_sequence;
pub mod realtime;
pub mod recorder;
pub mod report;
pub mod system_metrics;
pub mod workload;

pub use engine::*;
pub use hiccup::*;
pub use load_sequence::*;
pub use realtime::*;
pub use recorder::*;
pub use report::*;
pub use system_metrics::*;
pub use workload::*;
