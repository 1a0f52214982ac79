//! The `client` module holds the two roles a benchmark client can play.
//!
//! - `publisher`: connects, publishes its messages one at a time and
//!   produces a [`RunResult`](crate::results::RunResult)
//! - `subscriber`: connects, subscribes and records the delivery latency of
//!   every message it receives
//! - `message`: the generated messages and their SenML wire format
//!
//! Each client owns exactly one session and runs as its own task.

pub mod message;
pub mod publisher;
pub mod subscriber;

use crate::credentials::ChannelCredential;
use crate::session::{QoS, SessionCredential};
use crate::tls::TlsConfig;

pub use message::{
    DEFAULT_RECORD, Envelope, Message, MessageGenerator, PayloadTemplate, SenmlRecord,
    decode_envelope,
};
pub use publisher::Publisher;
pub use subscriber::{Readiness, Subscriber, SubscriberSummary};

/// Everything a client needs to know about itself.
#[derive(Debug, Clone)]
pub struct ClientSetup {
    pub id: String,
    pub topic: String,
    pub credential: SessionCredential,
    pub qos: QoS,
    pub retain: bool,
    pub quiet: bool,
}

impl ClientSetup {
    /// Builds the session credential from a fixture record.
    pub fn new(
        id: String,
        channel: &ChannelCredential,
        run_stamp: &str,
        tls: Option<TlsConfig>,
    ) -> Self {
        let (username, password) = match channel.login() {
            Some((user, pass)) => (Some(user), Some(pass)),
            None => (None, None),
        };
        Self {
            topic: channel.topic(run_stamp),
            credential: SessionCredential {
                client_id: id.clone(),
                username,
                password,
                tls,
            },
            id,
            qos: QoS::AtLeastOnce,
            retain: false,
            quiet: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}
