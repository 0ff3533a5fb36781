//! Configuration file loading and parsing

use super::{ConfigFormat, DataModuleConfig};
use kindling_core::{KindlingError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration source information
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    String { format: ConfigFormat },
}

/// Configuration loader for TOML and JSON
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// History of loaded configurations
    load_history: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file, picking the format from its extension
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<DataModuleConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            KindlingError::Io(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let format = Self::detect_format(path)?;
        let config = Self::parse_content(&content, format)?;
        log::info!("loaded {:?} configuration from {}", format, path.display());

        self.load_history.push(ConfigSource::File(path.to_path_buf()));
        Ok(config)
    }

    pub fn load_from_string(&mut self, content: &str, format: ConfigFormat) -> Result<DataModuleConfig> {
        let config = Self::parse_content(content, format)?;
        self.load_history.push(ConfigSource::String { format });
        Ok(config)
    }

    pub fn load_history(&self) -> &[ConfigSource] {
        &self.load_history
    }

    pub fn clear_history(&mut self) {
        self.load_history.clear();
    }

    /// Save configuration to file in the format matching its extension
    pub fn save_to_file<P: AsRef<Path>>(&self, config: &DataModuleConfig, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match Self::detect_format(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| {
                KindlingError::Serialization(format!("Failed to serialize TOML configuration: {}", e))
            })?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        };
        fs::write(path, content).map_err(|e| {
            KindlingError::Io(format!(
                "Failed to write configuration file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<ConfigFormat> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                KindlingError::configuration_with(
                    format!("Could not determine file extension for '{}'", path.display()),
                    [path.display().to_string()],
                )
            })?;

        ConfigFormat::from_extension(extension).ok_or_else(|| {
            KindlingError::configuration_with(
                format!("Unsupported configuration file format: '{}'", extension),
                [extension.to_string()],
            )
        })
    }

    fn parse_content(content: &str, format: ConfigFormat) -> Result<DataModuleConfig> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| {
                KindlingError::Serialization(format!("Failed to parse TOML configuration: {}", e))
            }),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| {
                KindlingError::Serialization(format!("Failed to parse JSON configuration: {}", e))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_core::RunningStage;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_toml_string() {
        let mut loader = ConfigLoader::new();
        let config = loader
            .load_from_string(
                r#"
batch_size = 16
val_split = 0.1
seed = 7

[transforms]
train = ["scale", { factor = 3 }]
predict = "identity"
"#,
                ConfigFormat::Toml,
            )
            .unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.val_split, Some(0.1));
        assert_eq!(config.num_workers, 0);
        assert!(config
            .transforms
            .transform_config(RunningStage::Training)
            .unwrap()
            .is_some());
        assert_eq!(loader.load_history(), [ConfigSource::String { format: ConfigFormat::Toml }]);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{"batch_size": 8, "num_workers": 2, "transforms": {{"val": ["scale"]}}}}"#).unwrap();

        let mut loader = ConfigLoader::new();
        let config = loader.load_from_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_workers, 2);
        assert!(config.transforms.val.is_some());
    }

    #[test]
    fn test_save_and_reload_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamodule.toml");
        let config = DataModuleConfig {
            batch_size: 32,
            seed: Some(1),
            ..Default::default()
        };
        let mut loader = ConfigLoader::new();
        loader.save_to_file(&config, &path).unwrap();
        assert_eq!(loader.load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_format_errors() {
        assert!(ConfigLoader::detect_format("settings.yaml").is_err());
        assert!(ConfigLoader::detect_format("settings").is_err());

        let mut loader = ConfigLoader::new();
        let err = loader.load_from_string("batch_size = [", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, KindlingError::Serialization(_)));
        assert!(loader.load_from_file("/nonexistent/kindling.toml").is_err());
    }
}
