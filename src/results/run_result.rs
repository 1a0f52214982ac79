use std::time::Duration;

use serde::Serialize;

use super::stats::{LatencyStats, RunningStats};
use crate::client::message::Message;

/// Outcome of one publisher's run. Latencies are in microseconds, the run
/// time in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub id: String,
    pub successes: u64,
    pub failures: u64,
    pub run_time: f64,
    pub msg_time_min: f64,
    pub msg_time_max: f64,
    pub msg_time_mean: f64,
    pub msg_time_std: f64,
    pub msgs_per_sec: f64,
}

impl RunResult {
    /// Result of a publisher that never got a session: every message failed.
    pub fn connection_failed(id: impl Into<String>, count: usize, elapsed: Duration) -> Self {
        Self {
            id: id.into(),
            successes: 0,
            failures: count as u64,
            run_time: elapsed.as_secs_f64(),
            msg_time_min: 0.0,
            msg_time_max: 0.0,
            msg_time_mean: 0.0,
            msg_time_std: 0.0,
            msgs_per_sec: 0.0,
        }
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of messages that were acknowledged; 1.0 when nothing was sent.
    pub fn ratio(&self) -> f64 {
        ratio(self.successes, self.failures)
    }

    pub fn latency(&self) -> LatencyStats {
        LatencyStats {
            min: self.msg_time_min,
            max: self.msg_time_max,
            mean: self.msg_time_mean,
            std: self.msg_time_std,
        }
    }
}

pub(crate) fn ratio(successes: u64, failures: u64) -> f64 {
    let total = successes + failures;
    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

/// Accumulates the outcome of every message of one publisher.
#[derive(Debug)]
pub struct RunRecorder {
    id: String,
    successes: u64,
    failures: u64,
    round_trips: RunningStats,
}

impl RunRecorder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            successes: 0,
            failures: 0,
            round_trips: RunningStats::new(),
        }
    }

    /// Records a finished message; the message is not needed afterwards.
    pub fn record(&mut self, message: &Message) {
        match message.round_trip() {
            Some(rtt) => {
                self.successes += 1;
                self.round_trips.push(rtt.as_secs_f64() * 1e6);
            }
            None => self.failures += 1,
        }
    }

    pub fn recorded(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn finish(self, elapsed: Duration) -> RunResult {
        let latency = self.round_trips.summary();
        let secs = elapsed.as_secs_f64();
        let msgs_per_sec = if secs > 0.0 {
            self.successes as f64 / secs
        } else {
            0.0
        };

        RunResult {
            id: self.id,
            successes: self.successes,
            failures: self.failures,
            run_time: secs,
            msg_time_min: latency.min,
            msg_time_max: latency.max,
            msg_time_mean: latency.mean,
            msg_time_std: latency.std,
            msgs_per_sec,
        }
    }
}
