//! # mqtt-bench
//!
//! `mqtt-bench` is a load generator for MQTT brokers. It starts a fleet of
//! subscribers, waits until every one of them is subscribed, then lets a
//! fleet of publishers send a fixed number of messages each and reports
//! round-trip and delivery latency statistics per client and in total.
//!
//! ## Core Modules
//!
//! - `bench`: the orchestrator that runs one benchmark end to end.
//! - `client`: publisher and subscriber clients plus the message generator.
//! - `session`: the broker session seam and its MQTT implementation.
//! - `results`: per-client results, subscriber observations and aggregation.
//! - `report`: text and JSON renderings of the aggregated report.
//! - `config`: layered settings (flags, config file, environment).
//! - `credentials`: channel/credential fixtures.
//! - `tls`: CA bundles, client certificates and rustls configuration.
//! - `cli`: command line flags.
//! - `utils`: error types and logging setup.

pub mod bench;
pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod report;
pub mod results;
pub mod session;
pub mod tls;
pub mod utils;

#[cfg(test)]
mod testing;
