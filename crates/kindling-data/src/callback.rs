//! Pipeline Callbacks
//!
//! Observers notified as samples and batches move through the processors.
//! Callbacks only see borrowed values and cannot alter what the pipeline
//! produces.

use indexmap::IndexMap;
use kindling_core::{RunningStage, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Observer of every processing phase; all methods default to no-ops
pub trait PipelineCallback: Send + Sync {
    fn on_load_sample(&self, _sample: &Value, _stage: RunningStage) {}

    fn on_per_sample_transform(&self, _sample: &Value, _stage: RunningStage) {}

    fn on_collate(&self, _batch: &Value, _stage: RunningStage) {}

    fn on_per_batch_transform(&self, _batch: &Value, _stage: RunningStage) {}

    fn on_per_sample_transform_on_device(&self, _sample: &Value, _stage: RunningStage) {}

    fn on_per_batch_transform_on_device(&self, _batch: &Value, _stage: RunningStage) {}
}

/// Ordered set of callbacks notified together
#[derive(Clone, Default)]
pub struct CallbackSet {
    callbacks: Vec<Arc<dyn PipelineCallback>>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn push(&mut self, callback: Arc<dyn PipelineCallback>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

impl PipelineCallback for CallbackSet {
    fn on_load_sample(&self, sample: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_load_sample(sample, stage);
        }
    }

    fn on_per_sample_transform(&self, sample: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_per_sample_transform(sample, stage);
        }
    }

    fn on_collate(&self, batch: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_collate(batch, stage);
        }
    }

    fn on_per_batch_transform(&self, batch: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_per_batch_transform(batch, stage);
        }
    }

    fn on_per_sample_transform_on_device(&self, sample: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_per_sample_transform_on_device(sample, stage);
        }
    }

    fn on_per_batch_transform_on_device(&self, batch: &Value, stage: RunningStage) {
        for cb in &self.callbacks {
            cb.on_per_batch_transform_on_device(batch, stage);
        }
    }
}

type Recorded = HashMap<RunningStage, IndexMap<String, Vec<Value>>>;

/// Records the values seen at each hook while enabled, for inspecting what a
/// pipeline produces
#[derive(Default)]
pub struct BaseDataFetcher {
    enabled: AtomicBool,
    batches: Mutex<Recorded>,
}

impl BaseDataFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording until the returned guard is dropped
    pub fn enable(&self) -> FetcherGuard<'_> {
        self.enabled.store(true, Ordering::SeqCst);
        FetcherGuard { fetcher: self }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Values recorded for `stage`, keyed by hook name
    pub fn batches(&self, stage: RunningStage) -> IndexMap<String, Vec<Value>> {
        self.lock().get(&stage).cloned().unwrap_or_default()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, hook: &str, value: &Value, stage: RunningStage) {
        if !self.is_enabled() {
            return;
        }
        self.lock()
            .entry(stage)
            .or_default()
            .entry(hook.to_string())
            .or_default()
            .push(value.clone());
    }
}

impl fmt::Debug for BaseDataFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseDataFetcher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl PipelineCallback for BaseDataFetcher {
    fn on_load_sample(&self, sample: &Value, stage: RunningStage) {
        self.record("load_sample", sample, stage);
    }

    fn on_per_sample_transform(&self, sample: &Value, stage: RunningStage) {
        self.record("per_sample_transform", sample, stage);
    }

    fn on_collate(&self, batch: &Value, stage: RunningStage) {
        self.record("collate", batch, stage);
    }

    fn on_per_batch_transform(&self, batch: &Value, stage: RunningStage) {
        self.record("per_batch_transform", batch, stage);
    }

    fn on_per_sample_transform_on_device(&self, sample: &Value, stage: RunningStage) {
        self.record("per_sample_transform_on_device", sample, stage);
    }

    fn on_per_batch_transform_on_device(&self, batch: &Value, stage: RunningStage) {
        self.record("per_batch_transform_on_device", batch, stage);
    }
}

/// Disables its [`BaseDataFetcher`] when dropped
pub struct FetcherGuard<'a> {
    fetcher: &'a BaseDataFetcher,
}

impl Drop for FetcherGuard<'_> {
    fn drop(&mut self) {
        self.fetcher.enabled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_records_only_while_enabled() {
        let fetcher = BaseDataFetcher::new();
        fetcher.on_load_sample(&Value::Int(0), RunningStage::Training);
        assert!(fetcher.batches(RunningStage::Training).is_empty());

        {
            let _guard = fetcher.enable();
            fetcher.on_load_sample(&Value::Int(1), RunningStage::Training);
            fetcher.on_collate(&Value::list([1]), RunningStage::Training);
        }
        assert!(!fetcher.is_enabled());
        fetcher.on_load_sample(&Value::Int(2), RunningStage::Training);

        let recorded = fetcher.batches(RunningStage::Training);
        assert_eq!(recorded["load_sample"], vec![Value::Int(1)]);
        assert_eq!(recorded["collate"].len(), 1);
        assert!(fetcher.batches(RunningStage::Validating).is_empty());

        fetcher.reset();
        assert!(fetcher.batches(RunningStage::Training).is_empty());
    }

    #[test]
    fn test_callback_set_fans_out() {
        let first = Arc::new(BaseDataFetcher::new());
        let second = Arc::new(BaseDataFetcher::new());
        let set = CallbackSet::new()
            .with(first.clone() as Arc<dyn PipelineCallback>)
            .with(second.clone() as Arc<dyn PipelineCallback>);
        let _a = first.enable();
        let _b = second.enable();
        set.on_per_batch_transform(&Value::Int(3), RunningStage::Testing);
        assert_eq!(first.batches(RunningStage::Testing)["per_batch_transform"].len(), 1);
        assert_eq!(second.batches(RunningStage::Testing)["per_batch_transform"].len(), 1);
    }
}
