use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::ClientSetup;
use super::message::{Message, MessageGenerator, PayloadTemplate};
use crate::results::{RunRecorder, RunResult};
use crate::session::{ProtocolSession, SessionHooks};
use crate::utils::error::PublishError;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Publishing,
    Draining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Publishing => "publishing",
            Phase::Draining => "draining",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Publishes a fixed number of messages over its own session and reports
/// one [`RunResult`].
pub struct Publisher<S> {
    setup: ClientSetup,
    session: S,
    template: PayloadTemplate,
    count: usize,
    publish_timeout: Duration,
    phase: Phase,
}

impl<S: ProtocolSession> Publisher<S> {
    pub fn new(
        setup: ClientSetup,
        session: S,
        template: PayloadTemplate,
        count: usize,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            setup,
            session,
            template,
            count,
            publish_timeout,
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, next: Phase) {
        debug!(client = %self.setup.id, from = %self.phase, to = %next, "publisher phase");
        self.phase = next;
    }

    /// Runs to completion. Never fails: every problem ends up as failures
    /// in the returned result.
    pub async fn run(mut self) -> RunResult {
        let started = Instant::now();
        let count = self.count;

        self.enter(Phase::Connecting);
        let lost = Arc::new(AtomicBool::new(false));
        let hooks = self.hooks(&lost);
        if let Err(e) = self.session.connect(&self.setup.credential, hooks).await {
            error!(client = %self.setup.id, error = %e, "publisher could not connect");
            self.enter(Phase::Done);
            return RunResult::connection_failed(self.setup.id, count, started.elapsed());
        }

        self.enter(Phase::Publishing);
        let mut recorder = RunRecorder::new(self.setup.id.clone());
        let generator = MessageGenerator::new(
            &self.setup.id,
            &self.setup.topic,
            self.setup.qos,
            self.setup.retain,
            &self.template,
            count,
        );
        for mut message in generator {
            if lost.load(Ordering::Acquire) {
                message.fail(PublishError::ConnectionLost(
                    "connection lost earlier in the run".to_string(),
                ));
            } else {
                self.publish(&mut message, &lost).await;
            }
            recorder.record(&message);

            let done = recorder.recorded();
            if !self.setup.quiet && done % PROGRESS_EVERY == 0 && done < count as u64 {
                info!(client = %self.setup.id, published = done, "still publishing");
            }
        }

        self.enter(Phase::Draining);
        if !lost.load(Ordering::Acquire) {
            self.session.disconnect().await;
        }
        self.enter(Phase::Done);

        let result = recorder.finish(started.elapsed());
        if !self.setup.quiet {
            info!(
                client = %result.id,
                successes = result.successes,
                failures = result.failures,
                "publisher done"
            );
        }
        result
    }

    async fn publish(&mut self, message: &mut Message, lost: &AtomicBool) {
        let payload = match message.payload(chrono::Utc::now().timestamp_micros()) {
            Ok(payload) => payload,
            Err(e) => {
                message.fail(PublishError::Rejected(format!("payload encoding: {e}")));
                return;
            }
        };

        message.mark_sent();
        let outcome = timeout(
            self.publish_timeout,
            self.session
                .publish(&message.topic, message.qos, message.retain, payload),
        )
        .await;

        match outcome {
            Ok(Ok(())) => message.mark_delivered(),
            Ok(Err(e)) => {
                if matches!(e, PublishError::ConnectionLost(_) | PublishError::NotConnected) {
                    lost.store(true, Ordering::Release);
                }
                debug!(client = %self.setup.id, seq = message.seq, error = %e, "publish failed");
                message.fail(e);
            }
            Err(_) => {
                debug!(client = %self.setup.id, seq = message.seq, "publish timed out");
                message.fail(PublishError::Timeout(self.publish_timeout));
            }
        }
    }

    fn hooks(&self, lost: &Arc<AtomicBool>) -> SessionHooks {
        let quiet = self.setup.quiet;
        let lost = Arc::clone(lost);
        SessionHooks {
            on_connected: Some(Arc::new(move |client: &str| {
                if !quiet {
                    info!(client, "publisher connected");
                }
            })),
            on_connection_lost: Some(Arc::new(move |client: &str, reason: &str| {
                warn!(client, reason, "publisher lost its connection");
                lost.store(true, Ordering::Release);
            })),
        }
    }
}
