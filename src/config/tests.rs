use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.url, "tcp://localhost:1883");
    assert_eq!(settings.message.size, 100);
    assert_eq!(settings.message.qos, 1);
    assert_eq!(settings.test.count, 10);
    assert_eq!(settings.test.pubs, 1);
    assert_eq!(settings.test.subs, 1);
    assert_eq!(settings.output.format, OutputFormat::Text);
    assert!(settings.channels.is_none());
    assert!(settings.validate().is_ok());
}

#[test]
fn test_partial_merges_over_defaults() {
    let partial = PartialSettings {
        test: Some(PartialTestSettings {
            pubs: Some(8),
            ..Default::default()
        }),
        message: Some(PartialMessageSettings {
            qos: Some(2),
            retain: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let settings = partial.merge_over(Settings::default());
    assert_eq!(settings.test.pubs, 8);
    assert_eq!(settings.test.subs, 1);
    assert_eq!(settings.message.qos, 2);
    assert!(settings.message.retain);
    assert_eq!(settings.message.size, 100);
}

#[test]
fn test_validate_rejects_empty_fleet() {
    let mut settings = Settings::default();
    settings.test.pubs = 0;
    settings.test.subs = 0;
    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_rejects_unknown_qos() {
    let mut settings = Settings::default();
    settings.message.qos = 3;
    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_allows_subscribers_only() {
    let mut settings = Settings::default();
    settings.test.pubs = 0;
    settings.test.count = 0;
    assert!(settings.validate().is_ok());
}

#[test]
#[serial_test::serial]
fn test_config_file_overrides_flags() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("bench.toml");
    let toml = r#"
        [broker]
        url = "tcps://broker.example:8883"

        [test]
        count = 250
        pubs = 4

        [output]
        format = "json"
    "#;
    fs::write(&path, toml).expect("write config file");

    let flags = PartialSettings {
        test: Some(PartialTestSettings {
            pubs: Some(2),
            subs: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };

    let settings = load_config(&flags, Some(&path)).expect("load_config failed");
    assert_eq!(settings.broker.url, "tcps://broker.example:8883");
    assert_eq!(settings.test.count, 250);
    assert_eq!(settings.test.pubs, 4);
    // Flags survive where the file is silent
    assert_eq!(settings.test.subs, 3);
    assert_eq!(settings.output.format, OutputFormat::Json);
}

#[test]
#[serial_test::serial]
fn test_environment_overrides_everything() {
    temp_env::with_vars(
        [
            ("MQTT_BENCH__TEST__SUBS", Some("7")),
            ("MQTT_BENCH__MESSAGE__RETAIN", Some("true")),
        ],
        || {
            let settings =
                load_config(&PartialSettings::default(), None).expect("load_config failed");
            assert_eq!(settings.test.subs, 7);
            assert!(settings.message.retain);
        },
    );
}

#[test]
#[serial_test::serial]
fn test_missing_config_file_is_an_error() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("missing.toml");
    assert!(load_config(&PartialSettings::default(), Some(&path)).is_err());
}

#[test]
fn test_validate_rejects_malformed_payload_template() {
    let mut settings = Settings::default();
    settings.message.payload = "not a record".to_string();
    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("SenML")));

    settings.message.payload = "[1, 2]".to_string();
    assert!(settings.validate().is_err());
}

#[test]
#[serial_test::serial]
fn test_payload_template_from_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("bench.toml");
    let toml = r#"
        [message]
        size = 300
        payload = '{"n":"humidity","u":"%RH","v":40}'
    "#;
    fs::write(&path, toml).expect("write config file");

    let settings = load_config(&PartialSettings::default(), Some(&path)).expect("load_config failed");
    assert_eq!(settings.message.payload, r#"{"n":"humidity","u":"%RH","v":40}"#);
    let template = settings.payload_template().expect("template");
    assert_eq!(template.size(), 300);
}
