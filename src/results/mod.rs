//! The `results` module turns raw message outcomes into statistics.
//!
//! - `stats`: streaming min/max/mean/std-dev
//! - `run_result`: per-publisher [`RunResult`] and its recorder
//! - `observations`: subscriber-side delivery latencies, shared by all
//!   subscribers
//! - `aggregator`: the pure cross-client aggregation into [`TotalResults`]

pub mod aggregator;
pub mod observations;
pub mod run_result;
pub mod stats;

pub use aggregator::{BenchReport, RunReport, TotalResults, aggregate};
pub use observations::SubscriberObservations;
pub use run_result::{RunRecorder, RunResult};
pub use stats::{LatencyStats, RunningStats};

#[cfg(test)]
mod tests;
