//! The `bench` module runs one benchmark end to end.
//!
//! A run goes through a fixed sequence:
//!
//! 1. every subscriber connects and subscribes, then reports to a barrier
//! 2. once all subscribers reported, every publisher starts
//! 3. the orchestrator collects exactly one [`RunResult`] per publisher
//! 4. subscribers are told publishing is over and drain what is in flight
//! 5. the results and subscriber observations are aggregated
//!
//! Settings, TLS material, the fixture and the session factory are all
//! owned by [`Benchmark`]; nothing is global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{
    ClientSetup, PayloadTemplate, Publisher, Readiness, Subscriber, SubscriberSummary,
};
use crate::config::Settings;
use crate::credentials::Fixture;
use crate::results::{BenchReport, RunResult, SubscriberObservations, aggregate};
use crate::session::{BrokerEndpoint, MqttSessionFactory, QoS, SessionFactory};
use crate::tls::{ClientIdentity, TlsConfig, TlsContext};
use crate::utils::error::ConfigError;

/// A fully validated benchmark, ready to run.
pub struct Benchmark<F: SessionFactory> {
    settings: Arc<Settings>,
    fixture: Fixture,
    factory: Arc<F>,
    qos: QoS,
    template: PayloadTemplate,
    // One entry per fixture record, shared by every client bound to it.
    tls: Vec<Option<TlsConfig>>,
}

impl Benchmark<MqttSessionFactory> {
    /// Validates `settings`, loads the fixture and TLS material and builds
    /// the MQTT session factory. Nothing touches the network yet.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut endpoint = BrokerEndpoint::parse(&settings.broker.url)?;
        // Client certificates only make sense over TLS.
        endpoint.tls |= settings.tls.mtls;
        let use_tls = endpoint.tls;

        let fixture = Fixture::load_or_anonymous(settings.channels.as_deref())?;
        let factory = MqttSessionFactory::new(
            endpoint,
            settings.broker.connect_timeout(),
            settings.broker.keep_alive(),
            settings.payload_template()?.max_len(),
        );
        Self::with_factory(settings, fixture, factory, use_tls)
    }
}

impl<F: SessionFactory> Benchmark<F> {
    pub fn with_factory(
        settings: Settings,
        fixture: Fixture,
        factory: F,
        use_tls: bool,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let qos = QoS::try_from(settings.message.qos)?;
        let template = settings.payload_template()?;
        let tls = if use_tls {
            tls_per_record(&settings, &fixture)?
        } else {
            vec![None; fixture.channel_count()]
        };

        Ok(Self {
            settings: Arc::new(settings),
            fixture,
            factory: Arc::new(factory),
            qos,
            template,
            tls,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn client_setup(&self, id: String, index: usize, run_stamp: &str) -> ClientSetup {
        let record = self.fixture.index_for(index);
        ClientSetup::new(
            id,
            &self.fixture.records()[record],
            run_stamp,
            self.tls[record].clone(),
        )
        .with_qos(self.qos)
        .with_retain(self.settings.message.retain)
        .quiet(self.settings.output.quiet)
    }

    /// Runs the benchmark to completion.
    ///
    /// Client failures never abort the run; they show up as failures in the
    /// report. Configuration problems were already rejected on construction.
    pub async fn run(&self) -> BenchReport {
        let started = Instant::now();
        let run_stamp = run_stamp();
        let test = &self.settings.test;
        info!(
            run = %run_stamp,
            publishers = test.pubs,
            subscribers = test.subs,
            messages = test.count,
            qos = u8::from(self.qos),
            "starting benchmark"
        );

        let observations = SubscriberObservations::new();
        let (finished_tx, finished_rx) = watch::channel(false);

        let mut subscribers = self.start_subscribers(&run_stamp, &observations, finished_rx).await;
        let runs = self.run_publishers(&run_stamp).await;

        if finished_tx.send(true).is_err() {
            debug!("no subscriber is waiting for the finished signal");
        }
        let mut summaries: Vec<SubscriberSummary> = Vec::with_capacity(test.subs);
        while let Some(joined) = subscribers.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "subscriber task failed"),
            }
        }
        let decode_failures: u64 = summaries.iter().map(|s| s.decode_failures).sum();
        if decode_failures > 0 {
            warn!(decode_failures, "some received messages could not be decoded");
        }

        let report = aggregate(&runs, &observations.snapshot(), started.elapsed());
        info!(
            run = %run_stamp,
            successes = report.totals.successes,
            failures = report.totals.failures,
            received = report.totals.received,
            "benchmark finished"
        );
        report
    }

    /// Spawns every subscriber and returns once each one reported ready or
    /// failed.
    async fn start_subscribers(
        &self,
        run_stamp: &str,
        observations: &SubscriberObservations,
        finished: watch::Receiver<bool>,
    ) -> JoinSet<SubscriberSummary> {
        let test = &self.settings.test;
        let mut subscribers = JoinSet::new();
        if test.subs == 0 {
            return subscribers;
        }

        // Every subscriber expects what all publishers on its topic send.
        let mut publishers_per_record = vec![0u64; self.fixture.channel_count()];
        for i in 0..test.pubs {
            publishers_per_record[self.fixture.index_for(i)] += 1;
        }

        let (ready_tx, mut ready_rx) = mpsc::channel(test.subs);
        for i in 0..test.subs {
            let setup = self.client_setup(format!("sub-{run_stamp}-{i}"), i, run_stamp);
            let expected = publishers_per_record[self.fixture.index_for(i)] * test.count as u64;
            let subscriber = Subscriber::new(
                setup,
                self.factory.create(),
                expected,
                observations.clone(),
                test.drain_timeout(),
                ready_tx.clone(),
                finished.clone(),
            );
            subscribers.spawn(subscriber.run());
        }
        drop(ready_tx);

        let mut ready = 0;
        for _ in 0..test.subs {
            match ready_rx.recv().await {
                Some(Readiness::Ready { id }) => {
                    debug!(client = %id, "subscriber ready");
                    ready += 1;
                }
                Some(Readiness::Failed { id, error }) => {
                    warn!(client = %id, %error, "subscriber will not receive anything");
                }
                // Senders left are gone unreported: those subscriber tasks died.
                None => break,
            }
        }
        info!(ready, total = test.subs, "subscribers in place");
        subscribers
    }

    /// Runs every publisher concurrently and returns their results in
    /// publisher index order.
    async fn run_publishers(&self, run_stamp: &str) -> Vec<RunResult> {
        let test = &self.settings.test;
        let mut publishers = JoinSet::new();
        let mut tasks = HashMap::with_capacity(test.pubs);

        for i in 0..test.pubs {
            let id = format!("pub-{run_stamp}-{i}");
            let publisher = Publisher::new(
                self.client_setup(id.clone(), i, run_stamp),
                self.factory.create(),
                self.template.clone(),
                test.count,
                self.settings.broker.publish_timeout(),
            );
            let handle = publishers.spawn(publisher.run());
            tasks.insert(handle.id(), (i, id));
        }

        let mut runs: Vec<(usize, RunResult)> = Vec::with_capacity(test.pubs);
        while let Some(joined) = publishers.join_next_with_id().await {
            match joined {
                Ok((task, result)) => {
                    let Some((index, _)) = tasks.remove(&task) else {
                        error!(client = %result.id, "result from an unknown publisher task");
                        continue;
                    };
                    runs.push((index, result));
                }
                Err(e) => {
                    let Some((index, id)) = tasks.remove(&e.id()) else {
                        error!(error = %e, "unknown publisher task failed");
                        continue;
                    };
                    error!(client = %id, error = %e, "publisher task failed");
                    runs.push((
                        index,
                        RunResult::connection_failed(id, test.count, Default::default()),
                    ));
                }
            }
        }

        runs.sort_by_key(|(index, _)| *index);
        runs.into_iter().map(|(_, run)| run).collect()
    }
}

fn tls_per_record(
    settings: &Settings,
    fixture: &Fixture,
) -> Result<Vec<Option<TlsConfig>>, ConfigError> {
    let context = TlsContext::load(&settings.tls)?;
    if context.skips_verification() {
        warn!("broker certificate verification is disabled");
    }

    if !settings.tls.mtls {
        let shared = context.client_config(None)?;
        return Ok(vec![Some(shared); fixture.channel_count()]);
    }

    fixture
        .records()
        .iter()
        .map(|record| {
            let (Some(cert), Some(key)) = (&record.mtls_cert, &record.mtls_key) else {
                return Err(ConfigError::Invalid(format!(
                    "channel {} has no client certificate and key for mTLS",
                    record.channel_id
                )));
            };
            let identity = ClientIdentity::from_pem(cert, key)?;
            context.client_config(Some(identity)).map(Some)
        })
        .collect()
}

/// Unique per run, so retained messages of earlier runs are never seen.
fn run_stamp() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        &nonce[..8]
    )
}
