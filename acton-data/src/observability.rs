//! Tracing subscriber setup

#[cfg(feature = "observability")]
use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON tracing subscriber filtered by `service.log_level`
///
/// An unparsable filter falls back to `info`. Calling this twice is
/// harmless; the second installation is ignored.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Tracing initialized for service: {}", config.service.name);
    }

    Ok(())
}

/// Without the `observability` feature the host application owns the subscriber
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing::debug!(
        "Tracing subscriber not installed for service: {}",
        config.service.name
    );
    Ok(())
}
