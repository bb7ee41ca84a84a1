//! Structured logging setup shared by the `backup-manager` and `backup-agent`
//! binaries.

#![warn(missing_docs, clippy::pedantic)]

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber: an `EnvFilter` seeded from
/// `RUST_LOG` (falling back to `default_filter` when unset) plus a
/// human-readable `fmt` layer.
///
/// Intended to be called once, near the top of `main`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_owned()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
