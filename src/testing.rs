//! In-memory broker used by the unit tests.
//!
//! Sessions created by [`MemoryFactory`] route publishes straight to the
//! handlers of matching subscriptions and log every call, so tests can
//! assert on ordering as well as on results.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::session::{
    MessageHandler, ProtocolSession, QoS, SessionCredential, SessionFactory, SessionHooks,
};
use crate::utils::error::{ConnectionError, PublishError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connected(String),
    Subscribed(String),
    Published(String),
    Disconnected(String),
}

#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    /// 1-based publish numbers, per session, that the broker rejects.
    pub fail_publishes: Option<RangeInclusive<usize>>,
    /// 1-based publish numbers, per session, that are never acknowledged.
    pub hang_publishes: Option<RangeInclusive<usize>>,
    /// Client ids starting with this prefix are refused.
    pub refuse_connect_prefix: Option<String>,
    /// Connecting panics for client ids this matches.
    pub panic_on_connect: Option<fn(&str) -> bool>,
    /// Every session drops after this many publishes.
    pub lose_after: Option<usize>,
    pub subscribe_delay: Duration,
}

struct Subscription {
    client_id: String,
    topic: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct Inner {
    options: BrokerOptions,
    calls: Mutex<Vec<Call>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(options: BrokerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                ..Inner::default()
            }),
        }
    }

    pub fn factory(&self) -> MemoryFactory {
        MemoryFactory {
            broker: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    fn log(&self, call: Call) {
        self.inner.calls.lock().push(call);
    }

    fn deliver(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self
            .inner
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(topic, payload);
        }
    }
}

pub struct MemoryFactory {
    broker: MemoryBroker,
}

impl SessionFactory for MemoryFactory {
    type Session = MemorySession;

    fn create(&self) -> MemorySession {
        MemorySession {
            broker: self.broker.clone(),
            client_id: None,
            hooks: SessionHooks::default(),
            published: 0,
            lost: false,
        }
    }
}

pub struct MemorySession {
    broker: MemoryBroker,
    client_id: Option<String>,
    hooks: SessionHooks,
    published: usize,
    lost: bool,
}

#[async_trait]
impl ProtocolSession for MemorySession {
    async fn connect(
        &mut self,
        credential: &SessionCredential,
        hooks: SessionHooks,
    ) -> Result<(), ConnectionError> {
        let options = &self.broker.inner.options;
        if options
            .panic_on_connect
            .is_some_and(|matches| matches(&credential.client_id))
        {
            panic!("connect blew up for {}", credential.client_id);
        }
        if let Some(prefix) = &options.refuse_connect_prefix {
            if credential.client_id.starts_with(prefix.as_str()) {
                return Err(ConnectionError::Refused("not authorized".to_string()));
            }
        }
        self.broker.log(Call::Connected(credential.client_id.clone()));
        hooks.connected(&credential.client_id);
        self.client_id = Some(credential.client_id.clone());
        self.hooks = hooks;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        _qos: QoS,
        _retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let Some(client_id) = self.client_id.clone() else {
            return Err(PublishError::NotConnected);
        };
        if self.lost {
            return Err(PublishError::ConnectionLost("gone".to_string()));
        }

        self.published += 1;
        let number = self.published;
        let options = &self.broker.inner.options;
        if options.lose_after.is_some_and(|limit| number > limit) {
            self.lost = true;
            self.hooks.lost(&client_id, "broker went away");
            return Err(PublishError::ConnectionLost("broker went away".to_string()));
        }

        self.broker.log(Call::Published(client_id));
        if options
            .hang_publishes
            .as_ref()
            .is_some_and(|range| range.contains(&number))
        {
            std::future::pending::<()>().await;
        }
        if options
            .fail_publishes
            .as_ref()
            .is_some_and(|range| range.contains(&number))
        {
            return Err(PublishError::Rejected("injected failure".to_string()));
        }
        self.broker.deliver(topic, &payload);
        Ok(())
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        _qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return Err(ConnectionError::NotConnected);
        };
        let delay = self.broker.inner.options.subscribe_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.broker.inner.subscriptions.lock().push(Subscription {
            client_id: client_id.clone(),
            topic: topic.to_string(),
            handler,
        });
        self.broker.log(Call::Subscribed(client_id));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(client_id) = self.client_id.take() {
            self.broker
                .inner
                .subscriptions
                .lock()
                .retain(|s| s.client_id != client_id);
            self.broker.log(Call::Disconnected(client_id));
        }
    }
}
