//! Tracing subscriber setup.
//!
//! `RUST_LOG`, when set, takes precedence over `[logging].level`. The
//! `json` format emits one JSON object per event for log shippers; `text`
//! is the human-readable default.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        _ => registry.with(fmt::layer().compact()).try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
