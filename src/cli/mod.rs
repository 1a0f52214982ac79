//! Command line flags.
//!
//! Flags are the lowest layer above the built-in defaults: a config file
//! and `MQTT_BENCH__*` environment variables both override them. A flag
//! that is not given leaves its setting untouched.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    OutputFormat, PartialBrokerSettings, PartialMessageSettings, PartialOutputSettings,
    PartialSettings, PartialTestSettings, PartialTlsSettings,
};

#[derive(Debug, Parser)]
#[command(name = "mqtt-bench", version, about = "MQTT publish/subscribe benchmark")]
pub struct Cli {
    /// Broker URL, e.g. tcp://localhost:1883 or ssl://broker:8883
    #[arg(long)]
    pub broker: Option<String>,

    /// Quality of service for publishes and subscriptions (0, 1 or 2)
    #[arg(long)]
    pub qos: Option<u8>,

    /// Payload size in bytes
    #[arg(long)]
    pub size: Option<usize>,

    /// Messages sent by each publisher
    #[arg(long)]
    pub count: Option<usize>,

    /// Number of publishers
    #[arg(long)]
    pub pubs: Option<usize>,

    /// Number of subscribers
    #[arg(long)]
    pub subs: Option<usize>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Config file (TOML, YAML or JSON); overrides flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Channel/credential fixture (TOML)
    #[arg(long)]
    pub channels: Option<PathBuf>,

    /// Only print totals and warnings
    #[arg(long)]
    pub quiet: bool,

    /// Publish with the retain flag set
    #[arg(long)]
    pub retain: bool,

    /// Authenticate with the client certificates from the fixture
    #[arg(long)]
    pub mtls: bool,

    /// Do not verify the broker certificate
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// CA bundle (PEM) used to verify the broker
    #[arg(long)]
    pub ca: Option<PathBuf>,

    /// Seconds to wait for CONNACK
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Seconds to wait for each publish acknowledgment
    #[arg(long)]
    pub publish_timeout: Option<u64>,

    /// Seconds subscribers keep listening after publishing finished
    #[arg(long)]
    pub drain_timeout: Option<u64>,
}

// Boolean switches only count when set, so an absent switch never
// overrides a value from a lower layer.
fn switch(on: bool) -> Option<bool> {
    on.then_some(true)
}

impl Cli {
    pub fn to_partial(&self) -> PartialSettings {
        PartialSettings {
            broker: Some(PartialBrokerSettings {
                url: self.broker.clone(),
                connect_timeout_secs: self.connect_timeout,
                publish_timeout_secs: self.publish_timeout,
                keep_alive_secs: None,
            }),
            message: Some(PartialMessageSettings {
                size: self.size,
                payload: None,
                qos: self.qos,
                retain: switch(self.retain),
            }),
            test: Some(PartialTestSettings {
                count: self.count,
                pubs: self.pubs,
                subs: self.subs,
                drain_timeout_secs: self.drain_timeout,
            }),
            tls: Some(PartialTlsSettings {
                mtls: switch(self.mtls),
                skip_tls_verify: switch(self.skip_tls_verify),
                ca: self.ca.clone(),
            }),
            output: Some(PartialOutputSettings {
                format: self.format,
                quiet: switch(self.quiet),
            }),
            channels: self.channels.clone(),
        }
    }
}
