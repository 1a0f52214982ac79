use super::*;
use crate::results::{RunResult, aggregate};
use std::collections::HashMap;
use std::time::Duration;

fn sample_report() -> BenchReport {
    let runs = vec![
        RunResult {
            id: "pub-r-0".to_string(),
            successes: 9,
            failures: 1,
            run_time: 1.5,
            msg_time_min: 100.0,
            msg_time_max: 900.0,
            msg_time_mean: 400.0,
            msg_time_std: 50.0,
            msgs_per_sec: 6.0,
        },
        RunResult::connection_failed("pub-r-1", 10, Duration::from_millis(250)),
    ];
    let mut observed = HashMap::new();
    observed.insert("pub-r-0".to_string(), vec![1200.0, 1800.0]);
    aggregate(&runs, &observed, Duration::from_secs(2))
}

#[test]
fn test_text_report_has_client_blocks_and_totals() {
    let text = render_text(&sample_report(), false);

    assert!(text.contains("======= CLIENT pub-r-0 ======="));
    assert!(text.contains("======= CLIENT pub-r-1 ======="));
    assert!(text.contains("Ratio:               0.900 (9/10)"));
    assert!(text.contains("Delivery mean (us):  1500.000"));
    assert!(text.contains("========= TOTAL (2) ========="));
    assert!(text.contains("Total Ratio:                 0.450 (9/20)"));
    assert!(text.contains("Received:                    2"));
}

#[test]
fn test_quiet_text_report_only_has_totals() {
    let text = render_text(&sample_report(), true);

    assert!(!text.contains("CLIENT"));
    assert!(text.starts_with("========= TOTAL (2) ========="));
}

#[test]
fn test_json_report_is_one_document() {
    let json = render(&sample_report(), OutputFormat::Json, true).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["runs"].as_array().unwrap().len(), 2);
    assert_eq!(value["runs"][1]["failures"], 10);
    assert_eq!(value["totals"]["received"], 2);
    assert_eq!(value["totals"]["msg_time_min"], 100.0);
}

#[test]
fn test_render_dispatches_on_format() {
    let report = sample_report();
    let text = render(&report, OutputFormat::Text, false).unwrap();
    assert_eq!(text, render_text(&report, false));
}
