//! Tracing setup for the binary and the tests.

use tracing_subscriber::EnvFilter;

/// Filter built from `RUST_LOG` when it is set and parses, otherwise from
/// `default_level` (configured as `server.log_level`). Anything unparseable
/// falls back to `info`.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.trim().to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber.
pub fn init(default_level: &str) {
    // try_init: tests call this more than once
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_target(false)
        .try_init();
}
