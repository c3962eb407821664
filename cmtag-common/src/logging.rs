//! Tracing subscriber initialization

use crate::{Error, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. "info",
/// "cmtag=debug") is used. Output goes to stderr so stdout stays free for
/// per-file reports.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", default_directive, e)))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Internal(format!("Tracing already initialized: {}", e)))
}
