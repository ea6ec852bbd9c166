//! ## dissect-telemetry::logging
//! **Structured logging setup**
//!
//! Installs a `tracing-subscriber` formatter with an `EnvFilter`. `RUST_LOG`
//! wins when set; otherwise the configured directives (default `info`) apply.

use dissect_config::TelemetryConfig;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct MemLogger;

impl MemLogger {
    /// Installs the global subscriber with the `info` default.
    pub fn init() -> Result<(), InitError> {
        Self::init_with_filter("info")
    }

    /// Installs the global subscriber, falling back to `directives` when
    /// `RUST_LOG` is unset.
    pub fn init_with_filter(directives: &str) -> Result<(), InitError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => Self::filter(directives)?,
        };
        fmt().with_env_filter(filter).with_thread_names(true).try_init()?;
        info!(directives, "logging initialized");
        Ok(())
    }

    /// Installs the global subscriber with the configured `log_filter`.
    pub fn from_config(config: &TelemetryConfig) -> Result<(), InitError> {
        Self::init_with_filter(&config.log_filter)
    }

    /// Parses `directives` into a filter.
    pub fn filter(directives: &str) -> Result<EnvFilter, InitError> {
        Ok(EnvFilter::try_new(directives)?)
    }
}
