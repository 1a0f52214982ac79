//! Cross-client aggregation.
//!
//! Second-order figures are statistics of per-client statistics: the mean
//! and deviation of per-client means, and the extremes of per-client
//! extremes. Clients contribute only when they have samples, so a client
//! whose connection failed does not drag minima to zero.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use super::run_result::{RunResult, ratio};
use super::stats::{LatencyStats, RunningStats};

/// A publisher's result together with what subscribers saw of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub run: RunResult,
    pub msg_del_count: u64,
    pub msg_del_time_min: f64,
    pub msg_del_time_max: f64,
    pub msg_del_time_mean: f64,
    pub msg_del_time_std: f64,
}

impl RunReport {
    pub fn delivery(&self) -> LatencyStats {
        LatencyStats {
            min: self.msg_del_time_min,
            max: self.msg_del_time_max,
            mean: self.msg_del_time_mean,
            std: self.msg_del_time_std,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TotalResults {
    pub ratio: f64,
    pub successes: u64,
    pub failures: u64,
    pub received: u64,
    pub total_run_time: f64,
    pub avg_run_time: f64,
    pub msg_time_min: f64,
    pub msg_time_max: f64,
    pub msg_del_time_min: f64,
    pub msg_del_time_max: f64,
    pub msg_time_mean_avg: f64,
    pub msg_time_mean_std: f64,
    pub msg_del_time_mean_avg: f64,
    pub msg_del_time_mean_std: f64,
    pub total_msgs_per_sec: f64,
    pub avg_msgs_per_sec: f64,
}

/// The full document handed to the printer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub runs: Vec<RunReport>,
    pub totals: TotalResults,
}

#[derive(Default)]
struct Extremes(Option<(f64, f64)>);

impl Extremes {
    fn include(&mut self, min: f64, max: f64) {
        self.0 = Some(match self.0 {
            Some((lo, hi)) => (lo.min(min), hi.max(max)),
            None => (min, max),
        });
    }

    fn get(&self) -> (f64, f64) {
        self.0.unwrap_or((0.0, 0.0))
    }
}

/// Combines publisher results and subscriber observations.
///
/// Pure: the same inputs always give the same report.
pub fn aggregate(
    runs: &[RunResult],
    observations: &HashMap<String, Vec<f64>>,
    total_run_time: Duration,
) -> BenchReport {
    let mut totals = TotalResults {
        total_run_time: total_run_time.as_secs_f64(),
        received: observations.values().map(|v| v.len() as u64).sum(),
        ..TotalResults::default()
    };

    let mut round_trip_extremes = Extremes::default();
    let mut delivery_extremes = Extremes::default();
    let mut round_trip_means = RunningStats::new();
    let mut delivery_means = RunningStats::new();
    let mut run_times = RunningStats::new();
    let mut throughputs = RunningStats::new();

    let mut reports = Vec::with_capacity(runs.len());
    for run in runs {
        let delivered: RunningStats = observations
            .get(&run.id)
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default();
        let delivery = delivered.summary();

        totals.successes += run.successes;
        totals.failures += run.failures;
        totals.total_msgs_per_sec += run.msgs_per_sec;
        run_times.push(run.run_time);
        throughputs.push(run.msgs_per_sec);

        if run.successes > 0 {
            round_trip_extremes.include(run.msg_time_min, run.msg_time_max);
            round_trip_means.push(run.msg_time_mean);
        }
        if !delivered.is_empty() {
            delivery_extremes.include(delivery.min, delivery.max);
            delivery_means.push(delivery.mean);
        }

        reports.push(RunReport {
            run: run.clone(),
            msg_del_count: delivered.count(),
            msg_del_time_min: delivery.min,
            msg_del_time_max: delivery.max,
            msg_del_time_mean: delivery.mean,
            msg_del_time_std: delivery.std,
        });
    }

    totals.ratio = ratio(totals.successes, totals.failures);
    (totals.msg_time_min, totals.msg_time_max) = round_trip_extremes.get();
    (totals.msg_del_time_min, totals.msg_del_time_max) = delivery_extremes.get();

    let means = round_trip_means.summary();
    totals.msg_time_mean_avg = means.mean;
    totals.msg_time_mean_std = means.std;

    let means = delivery_means.summary();
    totals.msg_del_time_mean_avg = means.mean;
    totals.msg_del_time_mean_std = means.std;

    totals.avg_run_time = run_times.summary().mean;
    totals.avg_msgs_per_sec = throughputs.summary().mean;

    BenchReport {
        runs: reports,
        totals,
    }
}
