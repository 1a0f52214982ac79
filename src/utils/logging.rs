use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber for the harness.
///
/// `RUST_LOG` wins when set, otherwise `default_level` applies to every
/// target. Output goes to stderr so a JSON report on stdout stays machine
/// readable. Later calls are no-ops.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// Unknown names fall back to info.
pub(crate) fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}
