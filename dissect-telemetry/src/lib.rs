//! # dissect-telemetry
//!
//! Logging setup and Prometheus export for the scope arenas.

use dissect_config::TelemetryConfig;
use thiserror::Error;

pub mod logging;
pub mod metrics;

pub use logging::{InitError, MemLogger};
pub use metrics::ArenaMetrics;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install logging: {0}")]
    Logging(#[source] InitError),
    #[error("failed to register arena metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Installs logging from `config` and returns the metrics exporter when
/// metrics are enabled.
pub fn init(config: &TelemetryConfig) -> Result<Option<ArenaMetrics>, TelemetryError> {
    MemLogger::from_config(config).map_err(TelemetryError::Logging)?;
    Ok(ArenaMetrics::from_config(config)?)
}
