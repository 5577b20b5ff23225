//! Structured logging setup for binaries, benches and examples embedding the
//! dispatcher.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the host. `RUST_LOG` overrides the default filter.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "warn";

/// Install a global stdout subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_filter: &str) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
}

/// Like [`init_logging`] but writes through the test harness's capture, and
/// ignores a subscriber installed by an earlier test.
pub fn init_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}
