use super::*;
use crate::client::message::{DEFAULT_RECORD, MessageGenerator, PayloadTemplate};
use crate::session::QoS;
use crate::utils::error::PublishError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn template() -> PayloadTemplate {
    PayloadTemplate::new(DEFAULT_RECORD, 16).unwrap()
}

fn run(id: &str, successes: u64, failures: u64, min: f64, max: f64, mean: f64) -> RunResult {
    RunResult {
        id: id.to_string(),
        successes,
        failures,
        run_time: 2.0,
        msg_time_min: min,
        msg_time_max: max,
        msg_time_mean: mean,
        msg_time_std: 0.0,
        msgs_per_sec: successes as f64 / 2.0,
    }
}

#[test]
fn test_running_stats_matches_sample_formulas() {
    let stats: RunningStats = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
    let summary = stats.summary();
    assert_eq!(stats.count(), 8);
    assert_eq!(summary.min, 2.0);
    assert_eq!(summary.max, 9.0);
    assert!((summary.mean - 5.0).abs() < 1e-12);
    // sample deviation: sqrt(32 / 7)
    assert!((summary.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
}

#[test]
fn test_running_stats_empty_and_single() {
    assert_eq!(RunningStats::new().summary(), LatencyStats::default());

    let one: RunningStats = [42.0].into_iter().collect();
    let summary = one.summary();
    assert_eq!(summary.min, 42.0);
    assert_eq!(summary.mean, 42.0);
    assert_eq!(summary.std, 0.0);
}

#[test]
fn test_running_stats_ignores_non_finite() {
    let stats: RunningStats = [1.0, f64::NAN, 3.0, f64::INFINITY].into_iter().collect();
    assert_eq!(stats.count(), 2);
    assert_eq!(stats.summary().mean, 2.0);
}

#[test]
fn test_summary_keeps_mean_within_bounds() {
    let samples = [0.1, 0.2, 0.3, 1e9, 1e-9, 17.5, 3.25];
    let summary = samples.into_iter().collect::<RunningStats>().summary();
    assert!(summary.min <= summary.mean && summary.mean <= summary.max);
    assert!(summary.std >= 0.0);
}

#[test]
fn test_recorder_counts_every_message() {
    let mut recorder = RunRecorder::new("pub-0");
    for mut message in MessageGenerator::new("pub-0", "t", QoS::AtLeastOnce, false, &template(), 10) {
        if message.seq % 3 == 0 {
            message.mark_sent();
            message.fail(PublishError::Rejected("nope".to_string()));
        } else {
            message.mark_sent();
            message.mark_delivered();
        }
        recorder.record(&message);
    }
    assert_eq!(recorder.recorded(), 10);

    let result = recorder.finish(Duration::from_secs(2));
    assert_eq!(result.successes, 6);
    assert_eq!(result.failures, 4);
    assert_eq!(result.total(), 10);
    assert!(result.msg_time_min >= 0.0);
    assert!(result.msg_time_min <= result.msg_time_mean);
    assert!(result.msg_time_mean <= result.msg_time_max);
    assert!((result.msgs_per_sec - 3.0).abs() < 1e-12);
}

#[test]
fn test_recorder_with_no_successes_reports_zeros() {
    let mut recorder = RunRecorder::new("pub-0");
    for mut message in MessageGenerator::new("pub-0", "t", QoS::AtMostOnce, false, &template(), 3) {
        message.fail(PublishError::ConnectionLost("gone".to_string()));
        recorder.record(&message);
    }
    let result = recorder.finish(Duration::ZERO);
    assert_eq!(result.successes, 0);
    assert_eq!(result.failures, 3);
    assert_eq!(result.latency(), LatencyStats::default());
    assert_eq!(result.msgs_per_sec, 0.0);
    assert_eq!(result.ratio(), 0.0);
}

#[test]
fn test_connection_failed_result_counts_all_messages() {
    let result = RunResult::connection_failed("pub-7", 25, Duration::from_millis(500));
    assert_eq!(result.successes, 0);
    assert_eq!(result.failures, 25);
    assert_eq!(result.run_time, 0.5);
}

#[test]
fn test_observations_record_and_count() {
    let observations = SubscriberObservations::new();
    observations.record("pub-1", 10.0);
    observations.record("pub-1", 12.0);
    observations.record("pub-2", 5.0);

    assert_eq!(observations.count_for("pub-1"), 2);
    assert_eq!(observations.count_for("pub-3"), 0);
    assert_eq!(observations.total(), 3);
    assert_eq!(observations.snapshot()["pub-1"], vec![10.0, 12.0]);
}

#[test]
fn test_concurrent_observation_writes_are_not_lost() {
    const WRITERS: usize = 8;
    const WRITES: usize = 1000;

    let observations = SubscriberObservations::new();
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let observations = observations.clone();
            std::thread::spawn(move || {
                for i in 0..WRITES {
                    observations.record("pub-shared", (w * WRITES + i) as f64);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(observations.count_for("pub-shared"), WRITERS * WRITES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_observation_writes_from_tasks() {
    const WRITERS: usize = 16;
    const WRITES: usize = 1000;

    let observations = SubscriberObservations::new();
    let barrier = Arc::new(tokio::sync::Barrier::new(WRITERS));
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..WRITERS {
        let observations = observations.clone();
        let barrier = Arc::clone(&barrier);
        tasks.spawn(async move {
            barrier.wait().await;
            for i in 0..WRITES {
                observations.record("pub-shared", i as f64);
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert_eq!(observations.total(), WRITERS * WRITES);
}

#[test]
fn test_aggregate_two_level_statistics() {
    let runs = vec![
        run("pub-0", 10, 0, 100.0, 300.0, 200.0),
        run("pub-1", 8, 2, 50.0, 500.0, 400.0),
    ];
    let mut observed = HashMap::new();
    observed.insert("pub-0".to_string(), vec![1000.0, 3000.0]);
    observed.insert("pub-1".to_string(), vec![500.0]);

    let report = aggregate(&runs, &observed, Duration::from_secs(3));
    let totals = &report.totals;

    assert_eq!(totals.successes, 18);
    assert_eq!(totals.failures, 2);
    assert!((totals.ratio - 0.9).abs() < 1e-12);
    assert_eq!(totals.received, 3);
    assert_eq!(totals.total_run_time, 3.0);
    assert_eq!(totals.msg_time_min, 50.0);
    assert_eq!(totals.msg_time_max, 500.0);
    assert_eq!(totals.msg_time_mean_avg, 300.0);
    // sample std of {200, 400}
    assert!((totals.msg_time_mean_std - 141.421_356_237_309_5).abs() < 1e-9);
    assert_eq!(totals.msg_del_time_min, 500.0);
    assert_eq!(totals.msg_del_time_max, 3000.0);
    // means of means, not the pooled mean (which would be 1500)
    assert_eq!(totals.msg_del_time_mean_avg, 1250.0);
    assert_eq!(totals.total_msgs_per_sec, 9.0);
    assert_eq!(totals.avg_msgs_per_sec, 4.5);
    assert_eq!(totals.avg_run_time, 2.0);

    assert_eq!(report.runs[0].msg_del_count, 2);
    assert_eq!(report.runs[0].msg_del_time_mean, 2000.0);
    assert_eq!(report.runs[1].delivery().min, 500.0);
}

#[test]
fn test_aggregate_skips_clients_without_samples() {
    let runs = vec![
        run("pub-0", 5, 0, 100.0, 200.0, 150.0),
        RunResult::connection_failed("pub-1", 5, Duration::from_secs(1)),
    ];
    let report = aggregate(&runs, &HashMap::new(), Duration::from_secs(1));
    let totals = &report.totals;

    assert_eq!(totals.msg_time_min, 100.0);
    assert_eq!(totals.msg_time_mean_avg, 150.0);
    assert_eq!(totals.msg_time_mean_std, 0.0);
    assert_eq!(totals.msg_del_time_min, 0.0);
    assert_eq!(totals.ratio, 0.5);
    assert_eq!(report.runs[1].msg_del_count, 0);
}

#[test]
fn test_aggregate_is_idempotent() {
    let runs = vec![
        run("pub-0", 3, 1, 10.0, 30.0, 20.0),
        run("pub-1", 4, 0, 15.0, 45.0, 25.0),
    ];
    let mut observed = HashMap::new();
    observed.insert("pub-0".to_string(), vec![1.0, 2.0, 3.0]);
    observed.insert("pub-1".to_string(), vec![4.0, 5.0]);

    let first = aggregate(&runs, &observed, Duration::from_secs(5));
    let second = aggregate(&runs, &observed, Duration::from_secs(5));
    assert_eq!(first, second);
}

#[test]
fn test_aggregate_without_runs_is_safe() {
    let report = aggregate(&[], &HashMap::new(), Duration::from_secs(1));
    assert!(report.runs.is_empty());
    assert_eq!(report.totals.ratio, 1.0);
    assert!(report.totals.msg_time_mean_avg.is_finite());
    assert_eq!(report.totals.avg_msgs_per_sec, 0.0);
}

#[test]
fn test_report_serializes_with_stable_field_names() {
    let runs = vec![run("pub-0", 1, 0, 5.0, 5.0, 5.0)];
    let report = aggregate(&runs, &HashMap::new(), Duration::from_secs(1));
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["runs"][0]["id"], "pub-0");
    assert_eq!(json["runs"][0]["successes"], 1);
    assert!(json["runs"][0].get("msg_del_time_mean").is_some());
    assert!(json["totals"].get("msg_time_mean_avg").is_some());
    assert_eq!(json["totals"]["ratio"], 1.0);
}
