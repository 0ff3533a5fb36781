//! Environment variable override handling
//!
//! Values such as `KINDLING_BATCH_SIZE=64` replace the matching field of a
//! loaded [`DataModuleConfig`].

use super::DataModuleConfig;
use kindling_core::{KindlingError, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Environment variable override handler
#[derive(Debug, Clone)]
pub struct EnvironmentOverride {
    prefix: String,
    /// Fixed variable set used instead of the process environment
    vars: Option<HashMap<String, String>>,
}

impl EnvironmentOverride {
    /// Handler reading the process environment with prefix `KINDLING_`
    pub fn new() -> Self {
        Self::with_prefix("KINDLING_")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            vars: None,
        }
    }

    /// Read from `vars` (full names, prefix included) instead of the process environment
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Apply environment variable overrides to a configuration
    pub fn apply_overrides(&self, mut config: DataModuleConfig) -> Result<DataModuleConfig> {
        if let Some(batch_size) = self.parse_env_var::<usize>("BATCH_SIZE")? {
            config.batch_size = batch_size;
        }

        if let Some(num_workers) = self.parse_env_var::<usize>("NUM_WORKERS")? {
            config.num_workers = num_workers;
        }

        if let Some(val_split) = self.parse_env_var::<f64>("VAL_SPLIT")? {
            config.val_split = Some(val_split);
        }

        if let Some(seed) = self.parse_env_var::<u64>("SEED")? {
            config.seed = Some(seed);
        }

        if let Some(pin_memory) = self.parse_bool_env_var("PIN_MEMORY")? {
            config.pin_memory = pin_memory;
        }

        if let Some(prefetch_factor) = self.parse_env_var::<usize>("PREFETCH_FACTOR")? {
            config.prefetch_factor = prefetch_factor;
        }

        Ok(config)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn get_env_var(&self, key: &str) -> Option<String> {
        let full_key = self.full_key(key);
        let value = match &self.vars {
            Some(vars) => vars.get(&full_key).cloned(),
            None => env::var(&full_key).ok(),
        };
        if let Some(ref value) = value {
            log::debug!("configuration override {}={}", full_key, value);
        }
        value
    }

    fn parse_env_var<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.get_env_var(key) else {
            return Ok(None);
        };
        value.trim().parse::<T>().map(Some).map_err(|e| {
            let full_key = self.full_key(key);
            KindlingError::configuration_with(
                format!("Failed to parse environment variable {}={}: {}", full_key, value, e),
                [full_key],
            )
        })
    }

    fn parse_bool_env_var(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.get_env_var(key) else {
            return Ok(None);
        };
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "enabled" => Ok(Some(true)),
            "false" | "0" | "no" | "off" | "disabled" => Ok(Some(false)),
            _ => {
                let full_key = self.full_key(key);
                Err(KindlingError::configuration_with(
                    format!(
                        "Invalid boolean value for environment variable {}: '{}'. Use true/false, 1/0, yes/no, on/off, or enabled/disabled",
                        full_key, value
                    ),
                    [full_key],
                ))
            }
        }
    }
}

impl Default for EnvironmentOverride {
    fn default() -> Self {
        Self::new()
    }
}
