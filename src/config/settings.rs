use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{DEFAULT_RECORD, PayloadTemplate};
use crate::utils::error::ConfigError;

/// Top-level benchmark settings.
///
/// Immutable once a run starts; the orchestrator shares it behind an `Arc`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub message: MessageSettings,
    pub test: TestSettings,
    pub tls: TlsSettings,
    pub output: OutputSettings,
    /// Channel/credential fixture file. `None` runs with one anonymous channel.
    pub channels: Option<PathBuf>,
}

/// Where to connect and how long to wait for the broker.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub connect_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub keep_alive_secs: u64,
}

/// Shape of every published message.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessageSettings {
    /// Target size of each SenML pack in bytes.
    pub size: usize,
    /// One SenML record in JSON, repeated to fill the pack.
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

/// Fleet size and per-publisher message count.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestSettings {
    pub count: usize,
    pub pubs: usize,
    pub subs: usize,
    /// How long subscribers keep listening after the last publisher is done.
    pub drain_timeout_secs: u64,
}

/// Broker verification and client certificates. TLS itself is chosen by
/// the broker URL scheme or implied by `mtls`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TlsSettings {
    pub mtls: bool,
    pub skip_tls_verify: bool,
    pub ca: Option<PathBuf>,
}

/// How the final report is printed.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub quiet: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl BrokerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl TestSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Settings {
    /// Parses the configured record template.
    pub fn payload_template(&self) -> Result<PayloadTemplate, ConfigError> {
        PayloadTemplate::new(&self.message.payload, self.message.size).map_err(|e| {
            ConfigError::Invalid(format!("message payload is not a SenML record: {e}"))
        })
    }

    /// Checks the values that do not need any file or network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test.pubs + self.test.subs < 1 {
            return Err(ConfigError::Invalid(
                "at least one publisher or subscriber is required".to_string(),
            ));
        }
        if self.message.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "qos must be 0, 1 or 2, got {}",
                self.message.qos
            )));
        }
        if self.test.pubs > 0 && self.test.count == 0 {
            return Err(ConfigError::Invalid(
                "message count must be at least 1".to_string(),
            ));
        }
        if self.message.size == 0 {
            return Err(ConfigError::Invalid(
                "message size must be at least 1 byte".to_string(),
            ));
        }
        if self.broker.connect_timeout_secs == 0 || self.broker.publish_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connect and publish timeouts must be positive".to_string(),
            ));
        }
        self.payload_template()?;
        Ok(())
    }
}

/// Partial settings as they come from flags, a config file or the
/// environment. Missing values are filled from [`Settings::default`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<PartialBrokerSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<PartialMessageSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<PartialTestSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<PartialTlsSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PartialOutputSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<PathBuf>,
}

/// Partial version of [`BrokerSettings`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialBrokerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive_secs: Option<u64>,
}

/// Partial version of [`MessageSettings`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialMessageSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain: Option<bool>,
}

/// Partial version of [`TestSettings`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialTestSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_timeout_secs: Option<u64>,
}

/// Partial version of [`TlsSettings`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialTlsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_tls_verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<PathBuf>,
}

/// Partial version of [`OutputSettings`].
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct PartialOutputSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge_over(self, defaults: Settings) -> Settings {
        let broker = self.broker.unwrap_or_default();
        let message = self.message.unwrap_or_default();
        let test = self.test.unwrap_or_default();
        let tls = self.tls.unwrap_or_default();
        let output = self.output.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                url: broker.url.unwrap_or(defaults.broker.url),
                connect_timeout_secs: broker
                    .connect_timeout_secs
                    .unwrap_or(defaults.broker.connect_timeout_secs),
                publish_timeout_secs: broker
                    .publish_timeout_secs
                    .unwrap_or(defaults.broker.publish_timeout_secs),
                keep_alive_secs: broker
                    .keep_alive_secs
                    .unwrap_or(defaults.broker.keep_alive_secs),
            },
            message: MessageSettings {
                size: message.size.unwrap_or(defaults.message.size),
                payload: message.payload.unwrap_or(defaults.message.payload),
                qos: message.qos.unwrap_or(defaults.message.qos),
                retain: message.retain.unwrap_or(defaults.message.retain),
            },
            test: TestSettings {
                count: test.count.unwrap_or(defaults.test.count),
                pubs: test.pubs.unwrap_or(defaults.test.pubs),
                subs: test.subs.unwrap_or(defaults.test.subs),
                drain_timeout_secs: test
                    .drain_timeout_secs
                    .unwrap_or(defaults.test.drain_timeout_secs),
            },
            tls: TlsSettings {
                mtls: tls.mtls.unwrap_or(defaults.tls.mtls),
                skip_tls_verify: tls.skip_tls_verify.unwrap_or(defaults.tls.skip_tls_verify),
                ca: tls.ca.or(defaults.tls.ca),
            },
            output: OutputSettings {
                format: output.format.unwrap_or(defaults.output.format),
                quiet: output.quiet.unwrap_or(defaults.output.quiet),
            },
            channels: self.channels.or(defaults.channels),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                url: "tcp://localhost:1883".to_string(),
                connect_timeout_secs: 10,
                publish_timeout_secs: 10,
                keep_alive_secs: 30,
            },
            message: MessageSettings {
                size: 100,
                payload: DEFAULT_RECORD.to_string(),
                qos: 1,
                retain: false,
            },
            test: TestSettings {
                count: 10,
                pubs: 1,
                subs: 1,
                drain_timeout_secs: 5,
            },
            tls: TlsSettings::default(),
            output: OutputSettings::default(),
            channels: None,
        }
    }
}
