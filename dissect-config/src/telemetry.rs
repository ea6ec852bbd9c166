//! Logging and metrics settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// `tracing` filter directives, e.g. `info` or `dissect_mem=debug`.
    #[serde(default = "default_log_filter")]
    #[validate(length(min = 1))]
    #[validate(custom(function = validation::validate_log_filter))]
    pub log_filter: String,

    /// Export per-arena allocator statistics.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            metrics: default_true(),
        }
    }
}
