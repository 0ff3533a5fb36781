//! DataLoader Builder Pattern
//!
//! Fluent construction of a [`DataLoader`]. When no processor is supplied the
//! worker-side processor of the input's own transform is used, or of an
//! identity transform for inputs without one.

use super::core::{DataLoader, DataLoaderConfig};
use super::samplers::Sampler;
use crate::callback::CallbackSet;
use crate::input::InputSource;
use crate::processor::{create_processors, InputTransformProcessor};
use crate::transforms::InputTransform;
use kindling_core::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating DataLoader with fluent API
pub struct DataLoaderBuilder {
    source: InputSource,
    config: DataLoaderConfig,
    processor: Option<InputTransformProcessor>,
    callbacks: CallbackSet,
}

impl DataLoaderBuilder {
    pub fn new(source: impl Into<InputSource>) -> Self {
        Self {
            source: source.into(),
            config: DataLoaderConfig::default(),
            processor: None,
            callbacks: CallbackSet::new(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.config.num_workers = num_workers;
        self
    }

    pub fn prefetch_factor(mut self, prefetch_factor: usize) -> Self {
        self.config.prefetch_factor = prefetch_factor;
        self
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.config.drop_last = drop_last;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn config(mut self, config: DataLoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit worker-side processor
    pub fn processor(mut self, processor: InputTransformProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Observers attached to the default processor
    pub fn callbacks(mut self, callbacks: CallbackSet) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Build the DataLoader with the specified sampler
    pub fn build<S: Sampler + 'static>(self, sampler: S) -> Result<DataLoader> {
        let processor = match self.processor {
            Some(processor) => processor,
            None => {
                let transform = self
                    .source
                    .transform()
                    .cloned()
                    .unwrap_or_else(|| Arc::new(InputTransform::new(self.source.running_stage())));
                create_processors(transform, self.callbacks)?.0
            }
        };
        DataLoader::new(self.source, Arc::new(sampler), self.config, processor)
    }
}

#[cfg(test)]
mod tests {
    use super::super::samplers::SequentialSampler;
    use super::*;
    use crate::input::Input;
    use crate::transforms::{shared, TransformConfig};
    use kindling_core::{RunningStage, Value};

    #[test]
    fn test_builder_settings() {
        let input = Input::from_values(RunningStage::Testing, vec![Value::Int(1); 6]).unwrap();
        let loader = DataLoaderBuilder::new(input)
            .batch_size(4)
            .num_workers(2)
            .prefetch_factor(3)
            .drop_last(true)
            .timeout(Duration::from_secs(5))
            .build(SequentialSampler::new())
            .unwrap();
        let config = loader.config();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.prefetch_factor, 3);
        assert!(config.drop_last);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(loader.len(), Some(1));
    }

    #[test]
    fn test_builder_uses_input_transform() {
        let double = shared(|v: Value| -> kindling_core::Result<Value> {
            Ok(Value::Int(v.as_int().unwrap_or_default() * 2))
        });
        let input = Input::from_values(RunningStage::Training, vec![Value::Int(1), Value::Int(2)])
            .unwrap()
            .with_transform(Some(TransformConfig::Callable(double)), None, None)
            .unwrap();
        let loader = DataLoaderBuilder::new(input)
            .batch_size(2)
            .build(SequentialSampler::new())
            .unwrap();
        let batch = loader.iter().next().unwrap().unwrap();
        assert_eq!(batch.as_tensor().map(|t| t.to_vec()), Some(vec![2.0, 4.0]));
    }
}
