//! The broker session seam.
//!
//! A [`ProtocolSession`] wraps exactly one broker connection. Clients only
//! talk to the broker through this trait, so the harness never depends on
//! the wire protocol itself. [`mqtt::MqttSession`] is the production
//! implementation.

pub mod mqtt;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::tls::TlsConfig;
use crate::utils::error::{ConfigError, ConnectionError, PublishError};

pub use mqtt::{BrokerEndpoint, MqttSession, MqttSessionFactory};

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ConfigError::Invalid(format!(
                "qos must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Identity a client presents to the broker. Owned by exactly one client.
#[derive(Clone)]
pub struct SessionCredential {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsConfig>,
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Invoked on the session's read path once per received message with the
/// topic and the raw payload. Must return quickly.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Connection lifecycle callbacks.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub on_connected: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    /// Called at most once, with the client id and the reason.
    pub on_connection_lost: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
}

impl SessionHooks {
    pub(crate) fn connected(&self, client_id: &str) {
        if let Some(hook) = &self.on_connected {
            hook(client_id);
        }
    }

    pub(crate) fn lost(&self, client_id: &str, reason: &str) {
        if let Some(hook) = &self.on_connection_lost {
            hook(client_id, reason);
        }
    }
}

/// One connection to the broker.
#[async_trait]
pub trait ProtocolSession: Send {
    /// Opens the connection. Not retried on failure.
    async fn connect(
        &mut self,
        credential: &SessionCredential,
        hooks: SessionHooks,
    ) -> Result<(), ConnectionError>;

    /// Publishes one message and waits for the broker's acknowledgment.
    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), PublishError>;

    /// Subscribes and routes every later message on `topic` to `handler`.
    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), ConnectionError>;

    async fn disconnect(&mut self);
}

/// Creates one fresh session per client.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: ProtocolSession + 'static;

    fn create(&self) -> Self::Session;
}
