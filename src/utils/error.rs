//! Error types used by the harness.
//!
//! Only [`ConfigError`] is fatal to a run. Connection, publish and decode
//! errors are scoped to one client or one message and end up as failure
//! counts in the report.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pre-flight configuration problems. Aborts the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("cannot load channel fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material: {0}")]
    Tls(String),

    #[error("invalid broker url '{url}': {reason}")]
    BrokerUrl { url: String, reason: String },
}

/// Failure to establish a broker session. Scoped to one client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("subscribe rejected for topic {0}")]
    SubscribeRejected(String),

    #[error("session is not connected")]
    NotConnected,
}

/// Failure to publish one message. Scoped to that message.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PublishError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),

    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("session is not connected")]
    NotConnected,
}

/// A received payload that does not carry a publisher id and send stamp.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pack has no records")]
    EmptyPack,

    #[error("empty publisher id")]
    MissingId,

    #[error("first record has no send stamp")]
    MissingStamp,
}
