//! Sequential composition of transforms

use super::{SharedTransform, Transform};
use kindling_core::{Result, Value};
use std::sync::Arc;

/// Applies each stage in order, feeding every result into the next stage
#[derive(Clone, Default)]
pub struct Compose {
    stages: Vec<SharedTransform>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform to the pipeline
    pub fn add<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.stages.push(Arc::new(transform));
        self
    }

    pub fn add_shared(mut self, transform: SharedTransform) -> Self {
        self.stages.push(transform);
        self
    }

    pub fn from_transforms(stages: Vec<SharedTransform>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, mut value: Value) -> Result<Value> {
        for stage in &self.stages {
            value = stage.apply(value)?;
        }
        Ok(value)
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.stages.iter().map(|s| s.describe()).collect();
        format!("Compose({})", inner.join(", "))
    }
}
