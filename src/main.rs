//! CLI for mqtt-bench
//!
//! Loads the layered settings, runs one benchmark and prints the report on
//! stdout. Configuration errors exit with status 1 before any connection
//! is attempted.

use std::process::ExitCode;

use clap::Parser;
use mqtt_bench::bench::Benchmark;
use mqtt_bench::cli::Cli;
use mqtt_bench::config::load_config;
use mqtt_bench::report;
use mqtt_bench::utils::logging;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_config(&cli.to_partial(), cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(if settings.output.quiet { "warn" } else { "info" });

    let format = settings.output.format;
    let quiet = settings.output.quiet;
    let benchmark = match Benchmark::from_settings(settings) {
        Ok(benchmark) => benchmark,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let report = benchmark.run().await;

    match report::render(&report, format, quiet) {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to render the report: {}", e);
            ExitCode::FAILURE
        }
    }
}
