//! Process-wide logging setup.
//!
//! Library code logs through `tracing`; binaries call [`init`] once to wire
//! a formatted subscriber. Safe to call more than once; only the first
//! call installs the subscriber.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global tracing subscriber with the given filter directive
/// (e.g. `"info"`, `"kgforge=debug"`). Falls back to `"info"` when the
/// directive does not parse. Subsequent calls are no-ops.
pub fn init(filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

/// Install the subscriber from `RUST_LOG`, defaulting to `"info"`.
pub fn init_from_env() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}
