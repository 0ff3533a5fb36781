//! Transforms
//!
//! The [`Transform`] trait is the single callable shape used at every hook
//! placement: per-sample, per-batch, on-device and collate. Plain closures
//! `Fn(Value) -> Result<Value>` implement it directly; collates that also
//! want per-sample metadata are wrapped in [`WithMetadata`].

use kindling_core::{Result, Value};
use std::fmt;
use std::sync::Arc;

pub mod apply_to_keys;
pub mod compose;
pub mod create;
pub mod input_transform;

pub use apply_to_keys::ApplyToKeys;
pub use compose::Compose;
pub use create::{create_transform, factory, TransformConfig, TransformFactory, TransformRegistry};
pub use input_transform::{
    InputTransform, InputTransformState, PipelineState, TransformHooks, TransformProvenance,
};

/// A callable applied to a sample or a batch
pub trait Transform: Send + Sync {
    fn apply(&self, value: Value) -> Result<Value>;

    /// Whether [`Transform::apply_with_metadata`] should receive the batch metadata
    fn accepts_metadata(&self) -> bool {
        false
    }

    fn apply_with_metadata(&self, value: Value, metadata: Option<Value>) -> Result<Value> {
        let _ = metadata;
        self.apply(value)
    }

    /// Human readable name used in logs and `Debug` output
    fn describe(&self) -> String {
        "<transform>".to_string()
    }
}

/// Shared, type-erased transform
pub type SharedTransform = Arc<dyn Transform>;

impl<F> Transform for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn apply(&self, value: Value) -> Result<Value> {
        self(value)
    }

    fn describe(&self) -> String {
        "<fn>".to_string()
    }
}

impl fmt::Debug for dyn Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Erase a transform into a [`SharedTransform`]
pub fn shared<T: Transform + 'static>(transform: T) -> SharedTransform {
    Arc::new(transform)
}

/// Returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn describe(&self) -> String {
        "Identity".to_string()
    }
}

/// Collate function that also receives the per-sample metadata list
pub struct WithMetadata<F>(pub F);

impl<F> Transform for WithMetadata<F>
where
    F: Fn(Value, Option<Value>) -> Result<Value> + Send + Sync,
{
    fn apply(&self, value: Value) -> Result<Value> {
        (self.0)(value, None)
    }

    fn accepts_metadata(&self) -> bool {
        true
    }

    fn apply_with_metadata(&self, value: Value, metadata: Option<Value>) -> Result<Value> {
        (self.0)(value, metadata)
    }

    fn describe(&self) -> String {
        "WithMetadata".to_string()
    }
}
