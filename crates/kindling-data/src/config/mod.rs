//! Configuration management
//!
//! [`DataModuleConfig`] can be loaded from TOML or JSON, overridden from
//! `KINDLING_*` environment variables and validated before use.
//!
//! ## Sub-modules
//!
//! - `core`: configuration types
//! - `loader`: file loading and parsing
//! - `env`: environment variable overrides
//! - `validation`: validation utilities

pub mod core;
pub mod env;
pub mod loader;
pub mod validation;

pub use self::core::{DataModuleConfig, StageTransforms};
pub use self::env::EnvironmentOverride;
pub use self::loader::{ConfigLoader, ConfigSource};
pub use self::validation::{ConfigValidation, ValidationError};

use kindling_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Loads, overrides and validates a [`DataModuleConfig`]
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: DataModuleConfig,
    loader: ConfigLoader,
    env_override: EnvironmentOverride,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env_override(mut self, env_override: EnvironmentOverride) -> Self {
        self.env_override = env_override;
        self
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&DataModuleConfig> {
        let config = self.loader.load_from_file(path)?;
        self.install(config)
    }

    pub fn load_from_string(&mut self, content: &str, format: ConfigFormat) -> Result<&DataModuleConfig> {
        let config = self.loader.load_from_string(content, format)?;
        self.install(config)
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    pub fn set_env_prefix(&mut self, prefix: &str) {
        self.env_override.set_prefix(prefix);
    }

    fn install(&mut self, config: DataModuleConfig) -> Result<&DataModuleConfig> {
        let config = self.env_override.apply_overrides(config)?;
        config.validate()?;
        for warning in config.get_warnings() {
            log::warn!("{}", warning);
        }
        self.config = config;
        Ok(&self.config)
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigFormat {
    /// TOML format (.toml)
    Toml,
    /// JSON format (.json)
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Toml => &["toml"],
            Self::Json => &["json"],
        }
    }
}
