//! Data Modules
//!
//! Groups up to four stage inputs with their loaders and transform
//! processors. Inputs are checked against the stage they are supplied for,
//! a validation set can be split off the train input, and every stage gets
//! its (worker, device) processor pair up front, so configuration errors
//! surface when the module is built rather than on the first batch.

use crate::callback::{BaseDataFetcher, CallbackSet, PipelineCallback};
use crate::config::{ConfigValidation, DataModuleConfig, StageTransforms};
use crate::dataloader::{DataLoader, DataLoaderConfig, RandomSampler, Sampler, SequentialSampler};
use crate::input::{Input, InputSource};
use crate::processor::{create_processors, InputTransformProcessor};
use crate::transforms::{create_transform, InputTransform, PipelineState, TransformRegistry};
use kindling_core::{KindlingError, Result, RunningStage, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Worker-side and device-side processors of one stage
#[derive(Debug, Clone)]
pub struct ProcessorPair {
    pub worker: InputTransformProcessor,
    pub device: InputTransformProcessor,
}

/// Split `input` into (train, val) subsets; the val subset is re-staged for validation
pub fn split_train_val(input: &Input, val_split: f64, seed: Option<u64>) -> Result<(Input, Input)> {
    if !(0.0..=1.0).contains(&val_split) {
        return Err(KindlingError::configuration_with(
            format!("`val_split` should be a float between 0 and 1. Found {}.", val_split),
            ["val_split"],
        ));
    }
    let len = input.len();
    let val_num_samples = (len as f64 * val_split) as usize;
    let mut indices: Vec<usize> = (0..len).collect();
    match seed {
        Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => indices.shuffle(&mut rand::rng()),
    }
    let train_indices = indices.split_off(val_num_samples);
    log::debug!(
        "split '{}' into {} train and {} val samples",
        input.name(),
        train_indices.len(),
        indices.len()
    );
    let train = input.subset(train_indices)?;
    let val = input.subset(indices)?.with_stage(RunningStage::Validating)?;
    Ok((train, val))
}

/// Stage inputs plus everything needed to load them
pub struct DataModule {
    inputs: HashMap<RunningStage, InputSource>,
    processors: HashMap<RunningStage, ProcessorPair>,
    batch_size: usize,
    loader_config: DataLoaderConfig,
    pin_memory: bool,
    persistent_workers: bool,
    seed: Option<u64>,
    train_sampler: Option<Arc<dyn Sampler>>,
    pipeline_state: Arc<PipelineState>,
    data_fetcher: Arc<BaseDataFetcher>,
}

impl DataModule {
    pub fn builder() -> DataModuleBuilder {
        DataModuleBuilder::new()
    }

    pub fn input(&self, stage: RunningStage) -> Option<&InputSource> {
        self.inputs.get(&stage)
    }

    pub fn train_input(&self) -> Option<&InputSource> {
        self.input(RunningStage::Training)
    }

    pub fn val_input(&self) -> Option<&InputSource> {
        self.input(RunningStage::Validating)
    }

    pub fn test_input(&self) -> Option<&InputSource> {
        self.input(RunningStage::Testing)
    }

    pub fn predict_input(&self) -> Option<&InputSource> {
        self.input(RunningStage::Predicting)
    }

    pub fn processors(&self, stage: RunningStage) -> Option<&ProcessorPair> {
        self.processors.get(&stage)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.loader_config.num_workers
    }

    pub fn pin_memory(&self) -> bool {
        self.pin_memory
    }

    /// Only meaningful with worker threads
    pub fn persistent_workers(&self) -> bool {
        self.persistent_workers && self.loader_config.num_workers > 0
    }

    pub fn pipeline_state(&self) -> &Arc<PipelineState> {
        &self.pipeline_state
    }

    pub fn data_fetcher(&self) -> &Arc<BaseDataFetcher> {
        &self.data_fetcher
    }

    /// Shuffled for map-style inputs, dropping the last batch when the input
    /// is larger than one batch
    pub fn train_dataloader(&self) -> Result<Option<DataLoader>> {
        let Some(source) = self.train_input() else {
            return Ok(None);
        };
        let (shuffle, drop_last) = match source.len() {
            Some(len) => (true, len > self.batch_size),
            None => (false, false),
        };
        let sampler: Arc<dyn Sampler> = match (&self.train_sampler, shuffle) {
            (Some(sampler), _) => Arc::clone(sampler),
            (None, true) => Arc::new(match self.seed {
                Some(seed) => RandomSampler::with_seed(seed),
                None => RandomSampler::new(),
            }),
            (None, false) => Arc::new(SequentialSampler::new()),
        };
        self.dataloader(RunningStage::Training, sampler, self.batch_size, drop_last)
    }

    pub fn val_dataloader(&self) -> Result<Option<DataLoader>> {
        self.sequential_dataloader(RunningStage::Validating, self.batch_size)
    }

    pub fn test_dataloader(&self) -> Result<Option<DataLoader>> {
        self.sequential_dataloader(RunningStage::Testing, self.batch_size)
    }

    /// The batch size is clamped to the input length
    pub fn predict_dataloader(&self) -> Result<Option<DataLoader>> {
        let batch_size = match self.predict_input().and_then(InputSource::len) {
            Some(len) => self.batch_size.min(len.max(1)),
            None => self.batch_size,
        };
        self.sequential_dataloader(RunningStage::Predicting, batch_size)
    }

    pub fn dataloader_for(&self, stage: RunningStage) -> Result<Option<DataLoader>> {
        match stage {
            RunningStage::Training => self.train_dataloader(),
            RunningStage::Validating => self.val_dataloader(),
            RunningStage::Testing => self.test_dataloader(),
            RunningStage::Predicting => self.predict_dataloader(),
        }
    }

    /// Run the device-side processor of `stage` on a transferred batch
    pub fn on_after_batch_transfer(&self, batch: Value, stage: RunningStage) -> Result<Value> {
        match self.processors.get(&stage) {
            Some(pair) => pair.device.process(batch),
            None => Ok(batch),
        }
    }

    fn sequential_dataloader(&self, stage: RunningStage, batch_size: usize) -> Result<Option<DataLoader>> {
        self.dataloader(stage, Arc::new(SequentialSampler::new()), batch_size, false)
    }

    fn dataloader(
        &self,
        stage: RunningStage,
        sampler: Arc<dyn Sampler>,
        batch_size: usize,
        drop_last: bool,
    ) -> Result<Option<DataLoader>> {
        let (Some(source), Some(pair)) = (self.inputs.get(&stage), self.processors.get(&stage)) else {
            return Ok(None);
        };
        let config = DataLoaderConfig {
            batch_size,
            drop_last,
            ..self.loader_config.clone()
        };
        DataLoader::new(source.clone(), sampler, config, pair.worker.clone()).map(Some)
    }
}

impl fmt::Debug for DataModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<RunningStage> = self.inputs.keys().copied().collect();
        stages.sort_by_key(|s| RunningStage::ALL.iter().position(|a| a == s));
        f.debug_struct("DataModule")
            .field("stages", &stages)
            .field("batch_size", &self.batch_size)
            .field("num_workers", &self.loader_config.num_workers)
            .finish()
    }
}

/// Builder for [`DataModule`]
pub struct DataModuleBuilder {
    inputs: Vec<(RunningStage, InputSource)>,
    batch_size: Option<usize>,
    val_split: Option<f64>,
    num_workers: usize,
    prefetch_factor: usize,
    timeout: Option<Duration>,
    pin_memory: bool,
    persistent_workers: bool,
    seed: Option<u64>,
    train_sampler: Option<Arc<dyn Sampler>>,
    transforms: StageTransforms,
    registry: Option<TransformRegistry>,
    pipeline_state: Option<Arc<PipelineState>>,
    data_fetcher: Option<Arc<BaseDataFetcher>>,
    callbacks: CallbackSet,
}

impl Default for DataModuleBuilder {
    fn default() -> Self {
        let defaults = DataLoaderConfig::default();
        Self {
            inputs: Vec::new(),
            batch_size: None,
            val_split: None,
            num_workers: defaults.num_workers,
            prefetch_factor: defaults.prefetch_factor,
            timeout: defaults.timeout,
            pin_memory: false,
            persistent_workers: false,
            seed: None,
            train_sampler: None,
            transforms: StageTransforms::default(),
            registry: None,
            pipeline_state: None,
            data_fetcher: None,
            callbacks: CallbackSet::new(),
        }
    }
}

impl DataModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn input(mut self, stage: RunningStage, input: InputSource) -> Self {
        self.inputs.retain(|(s, _)| *s != stage);
        self.inputs.push((stage, input));
        self
    }

    pub fn train_input(self, input: impl Into<InputSource>) -> Self {
        self.input(RunningStage::Training, input.into())
    }

    pub fn val_input(self, input: impl Into<InputSource>) -> Self {
        self.input(RunningStage::Validating, input.into())
    }

    pub fn test_input(self, input: impl Into<InputSource>) -> Self {
        self.input(RunningStage::Testing, input.into())
    }

    pub fn predict_input(self, input: impl Into<InputSource>) -> Self {
        self.input(RunningStage::Predicting, input.into())
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn val_split(mut self, val_split: f64) -> Self {
        self.val_split = Some(val_split);
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn prefetch_factor(mut self, prefetch_factor: usize) -> Self {
        self.prefetch_factor = prefetch_factor;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pin_memory(mut self, pin_memory: bool) -> Self {
        self.pin_memory = pin_memory;
        self
    }

    pub fn persistent_workers(mut self, persistent_workers: bool) -> Self {
        self.persistent_workers = persistent_workers;
        self
    }

    /// Seed for the validation split and train shuffling
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the default train sampler
    pub fn train_sampler<S: Sampler + 'static>(mut self, sampler: S) -> Self {
        self.train_sampler = Some(Arc::new(sampler));
        self
    }

    /// Registry used to build transforms named in the configuration
    pub fn registry(mut self, registry: TransformRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn pipeline_state(mut self, pipeline_state: Arc<PipelineState>) -> Self {
        self.pipeline_state = Some(pipeline_state);
        self
    }

    pub fn data_fetcher(mut self, data_fetcher: Arc<BaseDataFetcher>) -> Self {
        self.data_fetcher = Some(data_fetcher);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Take every setting, including per-stage transforms, from `config`
    pub fn config(mut self, config: &DataModuleConfig) -> Result<Self> {
        config.validate()?;
        self.batch_size = Some(config.batch_size);
        self.val_split = config.val_split;
        self.num_workers = config.num_workers;
        self.prefetch_factor = config.prefetch_factor;
        self.timeout = config.timeout_secs.map(Duration::from_secs);
        self.pin_memory = config.pin_memory;
        self.persistent_workers = config.persistent_workers;
        self.seed = config.seed;
        self.transforms = config.transforms.clone();
        Ok(self)
    }

    pub fn build(self) -> Result<DataModule> {
        let batch_size = self.batch_size.filter(|&b| b > 0).ok_or_else(|| {
            KindlingError::configuration_with(
                "The `batch_size` should be provided to the DataModule on instantiation.",
                ["batch_size"],
            )
        })?;

        for (stage, source) in &self.inputs {
            if source.running_stage() != *stage {
                return Err(KindlingError::configuration_with(
                    format!(
                        "'{}' was built for stage {} but supplied as the {} input.",
                        source.name(),
                        source.running_stage(),
                        stage
                    ),
                    [source.name().to_string()],
                ));
            }
        }

        let pipeline_state = self.pipeline_state.unwrap_or_default();
        let registry = self.registry.as_ref();
        let mut inputs: HashMap<RunningStage, InputSource> = self.inputs.into_iter().collect();

        let has_val = inputs.contains_key(&RunningStage::Validating);
        if let Some(val_split) = self.val_split {
            if inputs.contains_key(&RunningStage::Training) && has_val && val_split > 0.0 {
                return Err(KindlingError::configuration_with(
                    "A `val_dataset` was provided with `val_split`. Please, choose one or the other.",
                    ["val_split"],
                ));
            }
        }

        if let Some(train) = inputs.get_mut(&RunningStage::Training) {
            fill_transform(train, &self.transforms, &pipeline_state, registry)?;
        }

        if let (Some(val_split), false) = (self.val_split, has_val) {
            let split = match inputs.get(&RunningStage::Training) {
                Some(InputSource::Map(train)) => Some(split_train_val(train, val_split, self.seed)?),
                Some(InputSource::Iterable(_)) => {
                    return Err(KindlingError::configuration_with(
                        "`val_split` should be `None` when the dataset is built with an IterableDataset.",
                        ["val_split"],
                    ));
                }
                None => None,
            };
            if let Some((train, val)) = split {
                inputs.insert(RunningStage::Training, train.into());
                inputs.insert(RunningStage::Validating, val.into());
            }
        }

        let data_fetcher = self.data_fetcher.unwrap_or_default();
        let callbacks = {
            let mut callbacks = self.callbacks;
            callbacks.push(Arc::clone(&data_fetcher) as Arc<dyn PipelineCallback>);
            callbacks
        };

        let mut processors = HashMap::new();
        for (stage, source) in inputs.iter_mut() {
            fill_transform(source, &self.transforms, &pipeline_state, registry)?;
            let transform = match source.transform() {
                Some(t) if t.pipeline_state().is_some() => Arc::clone(t),
                Some(t) => Arc::new((**t).clone().with_pipeline_state(Arc::clone(&pipeline_state))),
                None => Arc::new(InputTransform::new(*stage).with_pipeline_state(Arc::clone(&pipeline_state))),
            };
            source.set_transform(Some(Arc::clone(&transform)));
            let (worker, device) = create_processors(transform, callbacks.clone())?;
            processors.insert(*stage, ProcessorPair { worker, device });
        }

        let loader_config = DataLoaderConfig {
            batch_size,
            num_workers: self.num_workers,
            prefetch_factor: self.prefetch_factor,
            drop_last: false,
            timeout: self.timeout,
        };
        loader_config.validate()?;

        let module = DataModule {
            inputs,
            processors,
            batch_size,
            loader_config,
            pin_memory: self.pin_memory,
            persistent_workers: self.persistent_workers,
            seed: self.seed,
            train_sampler: self.train_sampler,
            pipeline_state,
            data_fetcher,
        };
        log::info!("built {:?}", module);
        Ok(module)
    }
}

/// Attach the configured transform to an input that has none
fn fill_transform(
    source: &mut InputSource,
    transforms: &StageTransforms,
    pipeline_state: &Arc<PipelineState>,
    registry: Option<&TransformRegistry>,
) -> Result<()> {
    if source.transform().is_some() {
        return Ok(());
    }
    let stage = source.running_stage();
    let Some(config) = transforms.transform_config(stage)? else {
        return Ok(());
    };
    let transform = create_transform(Some(config), stage, Some(Arc::clone(pipeline_state)), registry)?;
    source.set_transform(transform.map(Arc::new));
    Ok(())
}
