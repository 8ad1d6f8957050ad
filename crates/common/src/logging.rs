//! Logging setup and configuration

use crate::config::LoggingSettings;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Thread names are included when
/// requested so per-session transfer threads can be told apart.
pub fn setup_logging(settings: &LoggingSettings) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(settings.thread_names))
        .try_init()
        .map_err(|e| crate::Error::Logging(e.to_string()))
}
