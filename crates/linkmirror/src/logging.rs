//! Process-wide logging setup.
//!
//! Installs a `tracing` subscriber and routes `log` records into it, so
//! the store layer (which logs through `log`) and the reconciler (which
//! uses `tracing`) end up in the same output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::LinkMirrorError;

/// Initializes global logging. `RUST_LOG` overrides `config.level`.
///
/// Fails if called more than once per process.
pub fn init(config: &LoggingConfig) -> Result<(), LinkMirrorError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.level)?,
    };

    let fmt_layer = if config.json {
        fmt::layer().json().with_current_span(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = Registry::default().with(fmt_layer).with(filter);

    tracing_log::LogTracer::init().map_err(|e| LinkMirrorError::Logging(e.to_string()))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LinkMirrorError::Logging(e.to_string()))?;

    Ok(())
}

fn filter_from(level: &str) -> Result<EnvFilter, LinkMirrorError> {
    EnvFilter::try_new(level)
        .map_err(|e| LinkMirrorError::Logging(format!("invalid log level '{}': {}", level, e)))
}
