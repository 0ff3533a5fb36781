//! Configuration validation utilities

use super::DataModuleConfig;
use kindling_core::{KindlingError, Result};

/// Validation error with detailed information
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Field path that failed validation
    pub field: String,
    pub message: String,
    pub current_value: Option<String>,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
            current_value: None,
        }
    }

    pub fn with_current_value(mut self, value: impl ToString) -> Self {
        self.current_value = Some(value.to_string());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error in '{}': {}", self.field, self.message)?;
        if let Some(ref value) = self.current_value {
            write!(f, " (current value: {})", value)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for KindlingError {
    fn from(err: ValidationError) -> Self {
        KindlingError::configuration_with(err.to_string(), [err.field])
    }
}

/// Configuration validation trait
pub trait ConfigValidation {
    /// Every violation, empty when valid
    fn validation_errors(&self) -> Vec<ValidationError>;

    /// Fail with one configuration error naming every offending field
    fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(KindlingError::configuration_with(
            format!("Configuration validation failed:\n{}", messages.join("\n")),
            errors.into_iter().map(|e| e.field),
        ))
    }

    /// Non-fatal issues
    fn get_warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

impl ConfigValidation for DataModuleConfig {
    fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.batch_size == 0 {
            errors.push(
                ValidationError::new("batch_size", "must be greater than zero")
                    .with_current_value(self.batch_size),
            );
        }

        if let Some(split) = self.val_split {
            if !(0.0..=1.0).contains(&split) {
                errors.push(
                    ValidationError::new("val_split", "should be a float between 0 and 1")
                        .with_current_value(split),
                );
            }
        }

        if self.num_workers > 0 && self.prefetch_factor == 0 {
            errors.push(
                ValidationError::new(
                    "prefetch_factor",
                    "must be greater than zero when num_workers > 0",
                )
                .with_current_value(self.prefetch_factor),
            );
        }

        if self.timeout_secs == Some(0) {
            errors.push(ValidationError::new("timeout_secs", "must be greater than zero when set"));
        }

        errors
    }

    fn get_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let cpus = std::thread::available_parallelism().map_or(1, usize::from);
        if self.num_workers > cpus * 2 {
            warnings.push(format!(
                "num_workers ({}) is much higher than CPU count ({}). This may cause performance degradation.",
                self.num_workers, cpus
            ));
        }

        if self.persistent_workers && self.num_workers == 0 {
            warnings.push("persistent_workers has no effect when num_workers is 0".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DataModuleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_all_violations_are_reported() {
        let config = DataModuleConfig {
            batch_size: 0,
            val_split: Some(1.5),
            num_workers: 2,
            prefetch_factor: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.offending(), ["batch_size", "val_split", "prefetch_factor"]);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_warnings() {
        let config = DataModuleConfig {
            persistent_workers: true,
            ..Default::default()
        };
        assert_eq!(config.get_warnings().len(), 1);
    }
}
