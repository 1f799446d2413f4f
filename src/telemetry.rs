//! Telemetry initialization.
//!
//! Plain `tracing` to stderr. Filtering follows `RUST_LOG` (default
//! `info`); set `SVNMELD_LOG_FORMAT=json` for machine-readable output —
//! useful when a migration run is driven by other tooling.
//!
//! All merge progress goes through tracing so stdout stays reserved for
//! the `--json` report.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Call once, at startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SVNMELD_LOG_FORMAT").is_ok_and(|v| v == "json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
