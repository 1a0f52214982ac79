use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::ClientSetup;
use super::message::decode_envelope;
use crate::results::SubscriberObservations;
use crate::session::{MessageHandler, ProtocolSession, SessionHooks};
use crate::utils::error::ConnectionError;

/// Sent once by every subscriber before any publisher starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready { id: String },
    Failed { id: String, error: ConnectionError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberSummary {
    pub id: String,
    pub received: u64,
    pub decode_failures: u64,
    pub connected: bool,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    decode_failures: AtomicU64,
}

/// Listens on its channel topic and records how long each message took to
/// arrive.
pub struct Subscriber<S> {
    setup: ClientSetup,
    session: S,
    expected: u64,
    observations: SubscriberObservations,
    drain_timeout: Duration,
    // Dropped as soon as readiness is reported.
    ready: Option<mpsc::Sender<Readiness>>,
    finished: watch::Receiver<bool>,
}

impl<S: ProtocolSession> Subscriber<S> {
    /// `expected` is the number of messages published on this subscriber's
    /// topic over the whole run; zero means "wait for the finished signal".
    pub fn new(
        setup: ClientSetup,
        session: S,
        expected: u64,
        observations: SubscriberObservations,
        drain_timeout: Duration,
        ready: mpsc::Sender<Readiness>,
        finished: watch::Receiver<bool>,
    ) -> Self {
        Self {
            setup,
            session,
            expected,
            observations,
            drain_timeout,
            ready: Some(ready),
            finished,
        }
    }

    pub async fn run(mut self) -> SubscriberSummary {
        let counters = Arc::new(Counters::default());
        let all_in = Arc::new(Notify::new());

        let hooks = self.hooks(&all_in);
        if let Err(error) = self.session.connect(&self.setup.credential, hooks).await {
            warn!(client = %self.setup.id, %error, "subscriber could not connect");
            return self.fail(error, &counters).await;
        }

        let handler = self.handler(&counters, &all_in);
        if let Err(error) = self
            .session
            .subscribe(&self.setup.topic, self.setup.qos, handler)
            .await
        {
            warn!(client = %self.setup.id, topic = %self.setup.topic, %error, "subscribe failed");
            self.session.disconnect().await;
            return self.fail(error, &counters).await;
        }

        debug!(client = %self.setup.id, topic = %self.setup.topic, "subscribed");
        let id = self.setup.id.clone();
        self.report(Readiness::Ready { id }).await;

        let mut finished = self.finished.clone();
        let publishing_done = async move {
            // A dropped sender counts as finished.
            let _ = finished.wait_for(|done| *done).await;
        };
        tokio::select! {
            _ = all_in.notified() => {}
            _ = publishing_done => {
                if self.expected > 0
                    && timeout(self.drain_timeout, all_in.notified()).await.is_err()
                {
                    debug!(client = %self.setup.id, "drain timeout elapsed");
                }
            }
        }

        self.session.disconnect().await;
        let summary = self.summary(&counters, true);
        if !self.setup.quiet {
            info!(
                client = %summary.id,
                received = summary.received,
                expected = self.expected,
                "subscriber done"
            );
        }
        summary
    }

    async fn fail(mut self, error: ConnectionError, counters: &Counters) -> SubscriberSummary {
        let id = self.setup.id.clone();
        self.report(Readiness::Failed { id, error }).await;
        self.summary(counters, false)
    }

    async fn report(&mut self, readiness: Readiness) {
        if let Some(ready) = self.ready.take() {
            if ready.send(readiness).await.is_err() {
                debug!(client = %self.setup.id, "nobody is waiting for readiness");
            }
        }
    }

    fn summary(&self, counters: &Counters, connected: bool) -> SubscriberSummary {
        SubscriberSummary {
            id: self.setup.id.clone(),
            received: counters.received.load(Ordering::Acquire),
            decode_failures: counters.decode_failures.load(Ordering::Acquire),
            connected,
        }
    }

    fn handler(&self, counters: &Arc<Counters>, all_in: &Arc<Notify>) -> MessageHandler {
        let id = self.setup.id.clone();
        let expected = self.expected;
        let observations = self.observations.clone();
        let counters = Arc::clone(counters);
        let all_in = Arc::clone(all_in);

        Arc::new(move |topic: &str, payload: &[u8]| {
            // Stamped before decoding so large packs do not inflate latency.
            let now = chrono::Utc::now().timestamp_micros();
            match decode_envelope(payload) {
                Ok(envelope) => {
                    let latency = now.saturating_sub(envelope.sent_unix_us).max(0);
                    observations.record(&envelope.publisher_id, latency as f64);
                    let received = counters.received.fetch_add(1, Ordering::AcqRel) + 1;
                    if received == expected {
                        all_in.notify_one();
                    }
                }
                Err(error) => {
                    counters.decode_failures.fetch_add(1, Ordering::AcqRel);
                    warn!(client = %id, topic, %error, "dropping undecodable message");
                }
            }
        })
    }

    fn hooks(&self, all_in: &Arc<Notify>) -> SessionHooks {
        let quiet = self.setup.quiet;
        let all_in = Arc::clone(all_in);
        SessionHooks {
            on_connected: Some(Arc::new(move |client: &str| {
                if !quiet {
                    info!(client, "subscriber connected");
                }
            })),
            // Nothing more will arrive, stop waiting.
            on_connection_lost: Some(Arc::new(move |client: &str, reason: &str| {
                warn!(client, reason, "subscriber lost its connection");
                all_in.notify_one();
            })),
        }
    }
}
