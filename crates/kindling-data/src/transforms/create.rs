//! Transform Creation
//!
//! Builds an [`InputTransform`] from any of the accepted configuration shapes:
//! a ready transform, a hook table, a single callable, a placement → callable
//! map, or a registry key with keyword arguments. Registry keys may also come
//! from JSON/TOML configuration as `"name"`, `["name"]` or
//! `["name", {kwargs}]`.

use super::input_transform::{InputTransform, PipelineState, TransformHooks, TransformProvenance};
use super::SharedTransform;
use kindling_core::{KindlingError, Registry, Result, RunningStage};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// Builds a hook table from keyword arguments
pub type TransformFactory = Arc<dyn Fn(&Map<String, JsonValue>) -> Result<TransformHooks> + Send + Sync>;

/// Named transform factories
pub type TransformRegistry = Registry<TransformFactory>;

const REGISTRY_FORMAT: &str = "The transform should be provided as a name or as a pair (name, {kwargs}) when requesting a transform from the registry.";

/// Erase a factory closure into a [`TransformFactory`]
pub fn factory<F>(f: F) -> TransformFactory
where
    F: Fn(&Map<String, JsonValue>) -> Result<TransformHooks> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Every accepted way of describing a transform
#[derive(Clone)]
pub enum TransformConfig {
    /// An already resolved transform, re-bound to the requested stage if needed
    Instance(InputTransform),
    /// A table of hook overrides
    Hooks(Arc<TransformHooks>),
    /// A single callable used as `per_sample_transform`
    Callable(SharedTransform),
    /// Placement name → callable
    Overrides(Vec<(String, SharedTransform)>),
    /// A registry entry built with keyword arguments
    Registry {
        name: String,
        kwargs: Map<String, JsonValue>,
    },
}

impl TransformConfig {
    pub fn registry(name: impl Into<String>) -> Self {
        TransformConfig::Registry {
            name: name.into(),
            kwargs: Map::new(),
        }
    }

    pub fn registry_with(name: impl Into<String>, kwargs: Map<String, JsonValue>) -> Self {
        TransformConfig::Registry {
            name: name.into(),
            kwargs,
        }
    }

    /// Parse a registry specification; `null` and empty lists mean "no transform"
    pub fn from_json(spec: &JsonValue) -> Result<Option<Self>> {
        match spec {
            JsonValue::Null => Ok(None),
            JsonValue::String(name) => Ok(Some(Self::registry(name.clone()))),
            JsonValue::Array(items) => match items.as_slice() {
                [] => Ok(None),
                [JsonValue::String(name)] => Ok(Some(Self::registry(name.clone()))),
                [JsonValue::String(name), JsonValue::Object(kwargs)] => {
                    Ok(Some(Self::registry_with(name.clone(), kwargs.clone())))
                }
                _ => Err(KindlingError::configuration_with(
                    REGISTRY_FORMAT,
                    [spec.to_string()],
                )),
            },
            other => Err(KindlingError::configuration_with(
                format!("The format for the transform isn't correct. Found {}", other),
                [other.to_string()],
            )),
        }
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformConfig::Instance(t) => f.debug_tuple("Instance").field(t).finish(),
            TransformConfig::Hooks(h) => f.debug_tuple("Hooks").field(h).finish(),
            TransformConfig::Callable(c) => f.debug_tuple("Callable").field(&c.describe()).finish(),
            TransformConfig::Overrides(o) => f
                .debug_tuple("Overrides")
                .field(&o.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
                .finish(),
            TransformConfig::Registry { name, kwargs } => f
                .debug_struct("Registry")
                .field("name", name)
                .field("kwargs", kwargs)
                .finish(),
        }
    }
}

impl From<InputTransform> for TransformConfig {
    fn from(t: InputTransform) -> Self {
        TransformConfig::Instance(t)
    }
}

impl From<TransformHooks> for TransformConfig {
    fn from(h: TransformHooks) -> Self {
        TransformConfig::Hooks(Arc::new(h))
    }
}

impl From<SharedTransform> for TransformConfig {
    fn from(c: SharedTransform) -> Self {
        TransformConfig::Callable(c)
    }
}

impl From<&str> for TransformConfig {
    fn from(name: &str) -> Self {
        TransformConfig::registry(name)
    }
}

/// Build the transform described by `config` for `running_stage`
pub fn create_transform(
    config: Option<TransformConfig>,
    running_stage: RunningStage,
    pipeline_state: Option<Arc<PipelineState>>,
    registry: Option<&TransformRegistry>,
) -> Result<Option<InputTransform>> {
    let Some(config) = config else {
        return Ok(None);
    };

    let transform = match config {
        TransformConfig::Instance(transform) => transform.for_stage(running_stage)?,
        TransformConfig::Hooks(hooks) => InputTransform::from_hooks(running_stage, hooks)?,
        TransformConfig::Callable(callable) => InputTransform::from_callable(running_stage, callable)?,
        TransformConfig::Overrides(overrides) => InputTransform::from_overrides(running_stage, overrides)?,
        TransformConfig::Registry { name, kwargs } => {
            let registry = registry.filter(|r| !r.is_empty()).ok_or_else(|| {
                KindlingError::lookup("input_transforms", name.clone(), Vec::<String>::new())
            })?;
            let build = registry.get(&name)?;
            let hooks = build(&kwargs)?;
            log::debug!("built transform '{}' from the registry for stage {}", name, running_stage);
            InputTransform::from_hooks(running_stage, hooks)?
                .with_provenance(TransformProvenance { name, kwargs })
        }
    };

    Ok(Some(match pipeline_state {
        Some(state) => transform.with_pipeline_state(state),
        None => transform,
    }))
}
