//! Telemetry initialization.
//!
//! Events go to stderr as compact tracing output, filtered by the
//! `CULPRIT_LOG` env var (default `info`). stdout stays reserved for
//! command output so flip listings can be piped and redirected.

use tracing_subscriber::EnvFilter;

/// Initialize the stderr subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_env("CULPRIT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
