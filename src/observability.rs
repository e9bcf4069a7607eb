//! Logging setup.

use crate::config::ObservabilityConfig;
use crate::error::{ChaosError, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| ChaosError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| ChaosError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!(level = %config.log_level, json = config.json_logs, "Logging initialized");
    Ok(())
}
