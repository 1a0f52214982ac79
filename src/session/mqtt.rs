//! MQTT 3.1.1 session on top of `rumqttc`.
//!
//! `rumqttc` splits a connection into an `AsyncClient` (requests) and an
//! `EventLoop` (network I/O). The event loop runs on its own task and
//! completes the pending acknowledgment slots the client side waits on:
//!
//! - QoS 0: the publish packet was handed to the network
//! - QoS 1: PUBACK for the packet id
//! - QoS 2: PUBCOMP for the packet id
//!
//! A client publishes one message at a time, so a single in-flight slot is
//! enough. Auto-reconnect is never attempted: once the event loop errors
//! the session is dead and every pending or later publish fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use super::{MessageHandler, ProtocolSession, QoS, SessionCredential, SessionFactory, SessionHooks};
use crate::utils::error::{ConfigError, ConnectionError, PublishError};

const REQUEST_CAPACITY: usize = 10;
const PACKET_OVERHEAD: usize = 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Parsed broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// Accepts `tcp://` and `mqtt://` (plain, default port 1883) or
    /// `ssl://`, `tls://`, `tcps://` and `mqtts://` (TLS, default port 8883).
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::BrokerUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        let (tls, default_port) = match url.scheme() {
            "tcp" | "mqtt" => (false, 1883),
            "ssl" | "tls" | "tcps" | "mqtts" => (true, 8883),
            other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            tls,
        })
    }
}

/// Builds [`MqttSession`]s that share one endpoint and timeout policy.
#[derive(Debug, Clone)]
pub struct MqttSessionFactory {
    endpoint: Arc<BrokerEndpoint>,
    connect_timeout: Duration,
    keep_alive: Duration,
    max_packet_size: usize,
}

impl MqttSessionFactory {
    pub fn new(
        endpoint: BrokerEndpoint,
        connect_timeout: Duration,
        keep_alive: Duration,
        payload_size: usize,
    ) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            connect_timeout,
            keep_alive,
            max_packet_size: payload_size + PACKET_OVERHEAD,
        }
    }
}

impl SessionFactory for MqttSessionFactory {
    type Session = MqttSession;

    fn create(&self) -> MqttSession {
        MqttSession {
            factory: self.clone(),
            client: None,
            shared: Arc::new(Shared::default()),
            driver: None,
        }
    }
}

struct InFlight {
    qos: QoS,
    pkid: Option<u16>,
    done: oneshot::Sender<Result<(), PublishError>>,
}

// State shared between the session and its event-loop task.
#[derive(Default)]
pub(super) struct Shared {
    inflight: Mutex<Option<InFlight>>,
    suback: Mutex<Option<oneshot::Sender<Result<(), ConnectionError>>>>,
    handler: Mutex<Option<MessageHandler>>,
    lost: Mutex<Option<String>>,
    closing: AtomicBool,
}

impl Shared {
    /// Opens the acknowledgment slot for the next publish. A slot left by a
    /// timed-out publish is dropped.
    pub(super) fn begin_publish(
        &self,
        qos: QoS,
    ) -> oneshot::Receiver<Result<(), PublishError>> {
        let (done, rx) = oneshot::channel();
        *self.inflight.lock() = Some(InFlight {
            qos,
            pkid: None,
            done,
        });
        rx
    }

    pub(super) fn begin_subscribe(&self) -> oneshot::Receiver<Result<(), ConnectionError>> {
        let (tx, rx) = oneshot::channel();
        *self.suback.lock() = Some(tx);
        rx
    }

    pub(super) fn subscribed(&self, result: Result<(), ConnectionError>) {
        if let Some(tx) = self.suback.lock().take() {
            let _ = tx.send(result);
        }
    }

    pub(super) fn record_outgoing(&self, pkid: u16) {
        let mut slot = self.inflight.lock();
        let Some(flight) = slot.as_mut() else {
            return;
        };
        if flight.pkid.is_some() {
            return;
        }
        flight.pkid = Some(pkid);
        if flight.qos == QoS::AtMostOnce {
            if let Some(flight) = slot.take() {
                let _ = flight.done.send(Ok(()));
            }
        }
    }

    pub(super) fn acknowledge(&self, qos: QoS, pkid: u16) {
        let mut slot = self.inflight.lock();
        let matches = slot
            .as_ref()
            .is_some_and(|f| f.qos == qos && f.pkid == Some(pkid));
        if matches {
            if let Some(flight) = slot.take() {
                let _ = flight.done.send(Ok(()));
            }
        }
    }

    pub(super) fn lost_reason(&self) -> Option<String> {
        self.lost.lock().clone()
    }

    pub(super) fn fail_all(&self, reason: &str) {
        *self.lost.lock() = Some(reason.to_string());
        if let Some(flight) = self.inflight.lock().take() {
            let _ = flight
                .done
                .send(Err(PublishError::ConnectionLost(reason.to_string())));
        }
        if let Some(tx) = self.suback.lock().take() {
            let _ = tx.send(Err(ConnectionError::Transport(reason.to_string())));
        }
    }
}

/// One MQTT connection.
pub struct MqttSession {
    factory: MqttSessionFactory,
    client: Option<AsyncClient>,
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

fn to_mqtt(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

impl MqttSession {
    fn options(&self, credential: &SessionCredential) -> Result<MqttOptions, ConnectionError> {
        let endpoint = &self.factory.endpoint;
        let mut options = MqttOptions::new(
            credential.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        options
            .set_keep_alive(self.factory.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(self.factory.max_packet_size, self.factory.max_packet_size);

        if let (Some(user), Some(pass)) = (&credential.username, &credential.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        if endpoint.tls {
            let tls = credential.tls.clone().ok_or_else(|| {
                ConnectionError::Transport("TLS endpoint without TLS configuration".to_string())
            })?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls)));
        }

        Ok(options)
    }
}

#[async_trait]
impl ProtocolSession for MqttSession {
    async fn connect(
        &mut self,
        credential: &SessionCredential,
        hooks: SessionHooks,
    ) -> Result<(), ConnectionError> {
        let options = self.options(credential)?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();

        let driver = tokio::spawn(drive(
            eventloop,
            Arc::clone(&self.shared),
            connack_tx,
            hooks.clone(),
            credential.client_id.clone(),
        ));

        let connect_timeout = self.factory.connect_timeout;
        let outcome = match timeout(connect_timeout, connack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectionError::Transport(
                "event loop stopped before CONNACK".to_string(),
            )),
            Err(_) => Err(ConnectionError::Timeout(connect_timeout)),
        };

        match outcome {
            Ok(()) => {
                self.client = Some(client);
                self.driver = Some(driver);
                hooks.connected(&credential.client_id);
                Ok(())
            }
            Err(e) => {
                driver.abort();
                Err(e)
            }
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let Some(client) = &self.client else {
            return Err(PublishError::NotConnected);
        };

        let done_rx = self.shared.begin_publish(qos);
        // The event loop may have died between two publishes.
        if let Some(reason) = self.shared.lost_reason() {
            self.shared.inflight.lock().take();
            return Err(PublishError::ConnectionLost(reason));
        }

        client
            .publish(topic, to_mqtt(qos), retain, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(PublishError::ConnectionLost(
                self.shared
                    .lost_reason()
                    .unwrap_or_else(|| "session closed".to_string()),
            )),
        }
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), ConnectionError> {
        let Some(client) = &self.client else {
            return Err(ConnectionError::NotConnected);
        };

        *self.shared.handler.lock() = Some(handler);
        let suback_rx = self.shared.begin_subscribe();

        client
            .subscribe(topic, to_mqtt(qos))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let connect_timeout = self.factory.connect_timeout;
        match timeout(connect_timeout, suback_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(ConnectionError::SubscribeRejected(_)))) => {
                Err(ConnectionError::SubscribeRejected(topic.to_string()))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(ConnectionError::Transport(
                "event loop stopped before SUBACK".to_string(),
            )),
            Err(_) => Err(ConnectionError::Timeout(connect_timeout)),
        }
    }

    async fn disconnect(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!("disconnect request not delivered: {e}");
            }
        }
        if let Some(mut driver) = self.driver.take() {
            if timeout(SHUTDOWN_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    connack: oneshot::Sender<Result<(), ConnectionError>>,
    hooks: SessionHooks,
    client_id: String,
) {
    let mut connack = Some(connack);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if let Some(tx) = connack.take() {
                    if ack.code == ConnectReturnCode::Success {
                        let _ = tx.send(Ok(()));
                    } else {
                        let _ = tx.send(Err(ConnectionError::Refused(format!("{:?}", ack.code))));
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let handler = shared.handler.lock().clone();
                if let Some(handler) = handler {
                    handler(publish.topic.as_str(), publish.payload.as_ref());
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                shared.acknowledge(QoS::AtLeastOnce, ack.pkid);
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                shared.acknowledge(QoS::ExactlyOnce, comp.pkid);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                let result = if rejected {
                    Err(ConnectionError::SubscribeRejected(String::new()))
                } else {
                    Ok(())
                };
                shared.subscribed(result);
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                shared.record_outgoing(pkid);
            }
            Ok(_) => {}
            Err(e) => {
                let reason = e.to_string();
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Err(ConnectionError::Transport(reason)));
                    return;
                }
                if shared.closing.load(Ordering::Acquire) {
                    debug!(client = %client_id, "event loop closed");
                    return;
                }
                warn!(client = %client_id, "connection lost: {reason}");
                shared.fail_all(&reason);
                hooks.lost(&client_id, &reason);
                return;
            }
        }
    }
}
