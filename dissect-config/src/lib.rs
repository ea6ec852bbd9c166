//! # dissect-config
//!
//! Layered configuration for the memory subsystem: which strategy backs each
//! scope arena, the optional debugging override, and logging/metrics
//! settings.
//!
//! ## Features
//! - **Validation**: rejects strategy choices that would leak for the
//!   lifetime of the process
//! - **Environment Awareness**: per-environment YAML overlays and
//!   `DISSECT_*` variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use dissect_mem::ScopeSettings;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

mod error;
mod scopes;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use scopes::ScopesConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/dissect.yaml";
const ENV_PREFIX: &str = "DISSECT_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct MemConfig {
    /// Strategy per scope arena.
    #[serde(default)]
    #[validate(nested)]
    pub scopes: ScopesConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl MemConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/dissect.yaml`. If missing, defaults are used.
    /// 3. `config/<DISSECT_ENV>.yaml` - Environment-specific overrides.
    /// 4. `DISSECT_*` environment variables (`__` separates nested keys).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(MemConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            debug!("{BASE_FILE} not found, using default configuration");
        }

        let env = std::env::var("DISSECT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{env}.yaml");
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, still honouring `DISSECT_*`
    /// variables.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::finish(
            Figment::from(Serialized::defaults(MemConfig::default())).merge(Yaml::file(path)),
        )
    }

    /// The scope settings to pass to `dissect_mem::init_with`.
    pub fn scope_settings(&self) -> ScopeSettings {
        ScopeSettings::from(&self.scopes)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
