//! Error Types
//!
//! A single error enum shared by every kindling crate. Configuration and lookup
//! failures are raised synchronously at construction time and carry the names
//! of the offending hooks, keys or registry entries so they can be located
//! without inspecting internals. Failures raised by user transforms are
//! propagated as-is.

use thiserror::Error;

/// Errors produced while building or running a data pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KindlingError {
    /// Invalid pipeline configuration, detected before any data is processed
    #[error("Configuration error: {reason}")]
    Configuration {
        reason: String,
        /// Hook names, keys or variables the error refers to
        offending: Vec<String>,
    },

    /// A named entry was requested from a registry that does not hold it
    #[error("Lookup error in registry '{registry}': {key:?} not found (available: {available:?})")]
    Lookup {
        registry: String,
        key: String,
        available: Vec<String>,
    },

    #[error("Invalid argument in operation '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("Invalid shape in operation '{operation}': {reason}")]
    InvalidShape { operation: String, reason: String },

    /// Raised from inside a user-supplied transform or loader hook
    #[error("Transform '{hook}' failed: {reason}")]
    Transform { hook: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl KindlingError {
    /// Configuration error without any named offenders
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
            offending: Vec::new(),
        }
    }

    /// Configuration error naming the hooks or keys responsible
    pub fn configuration_with<I, S>(reason: impl Into<String>, offending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Configuration {
            reason: reason.into(),
            offending: offending.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lookup<I, S>(registry: impl Into<String>, key: impl Into<String>, available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lookup {
            registry: registry.into(),
            key: key.into(),
            available: available.into_iter().map(Into::into).collect(),
        }
    }

    pub fn invalid_argument_op(operation: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_shape_op(operation: &str, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    /// Error raised by a user transform or loader hook
    pub fn transform(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }

    /// Names carried by a configuration error, empty for every other kind
    pub fn offending(&self) -> &[String] {
        match self {
            Self::Configuration { offending, .. } => offending,
            _ => &[],
        }
    }

    /// Whether the rendered message or the offender list mentions `name`
    pub fn mentions(&self, name: &str) -> bool {
        self.offending().iter().any(|o| o == name) || self.to_string().contains(name)
    }
}

impl From<ndarray::ShapeError> for KindlingError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::invalid_shape_op("ndarray", err.to_string())
    }
}

impl From<serde_json::Error> for KindlingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for KindlingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type used throughout kindling
pub type Result<T> = std::result::Result<T, KindlingError>;
