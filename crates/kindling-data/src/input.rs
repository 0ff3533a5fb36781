//! Inputs
//!
//! Datasets built from a `load_data`/`load_sample` hook pair. `load_data` runs
//! once at construction, when a non-null data argument is supplied, and
//! produces the raw collection; `load_sample` runs on every access. Both hooks
//! are resolved like transform hooks: `{stage}_load_data` takes precedence
//! over `load_data`.
//!
//! [`Input`] requires data with a length and offers indexed access;
//! [`IterableInput`] requires a stream without one and is consumed through
//! `Iterator`. Construction is two-phase: the data is loaded, then the
//! variant is validated against it before the input is returned.

use crate::hooks::{HookBase, HookSlot, HookTable};
use crate::transforms::{create_transform, InputTransform, PipelineState, TransformConfig, TransformRegistry};
use kindling_core::{DataKeys, KindlingError, Result, RunningStage, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The two dataset hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputHook {
    LoadData,
    LoadSample,
}

impl InputHook {
    pub const ALL: [InputHook; 2] = [InputHook::LoadData, InputHook::LoadSample];
}

impl HookBase for InputHook {
    fn base_name(self) -> &'static str {
        match self {
            InputHook::LoadData => "load_data",
            InputHook::LoadSample => "load_sample",
        }
    }

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn allows_key(self) -> bool {
        false
    }
}

/// Stream of raw samples, with per-item failures
pub type SampleStream = Box<dyn Iterator<Item = Result<Value>> + Send>;

/// Source of samples without a known length; every `open` starts a fresh pass
pub trait StreamSource: Send + Sync {
    fn open(&self) -> Result<SampleStream>;
}

impl<F, I> StreamSource for F
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = Value>,
    I::IntoIter: Send + 'static,
{
    fn open(&self) -> Result<SampleStream> {
        Ok(Box::new(self().into_iter().map(Ok)))
    }
}

/// Argument handed to `load_data`
#[derive(Clone)]
pub enum RawData {
    Value(Value),
    Stream(Arc<dyn StreamSource>),
}

impl RawData {
    pub fn stream<S: StreamSource + 'static>(source: S) -> Self {
        RawData::Stream(Arc::new(source))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawData::Value(Value::Null))
    }
}

impl From<Value> for RawData {
    fn from(value: Value) -> Self {
        RawData::Value(value)
    }
}

impl From<Vec<Value>> for RawData {
    fn from(values: Vec<Value>) -> Self {
        RawData::Value(Value::List(values))
    }
}

/// Collection produced by `load_data`
#[derive(Clone)]
pub enum InputData {
    Sequence(Arc<Vec<Value>>),
    Stream(Arc<dyn StreamSource>),
}

impl InputData {
    pub fn sequence(values: Vec<Value>) -> Self {
        InputData::Sequence(Arc::new(values))
    }

    /// Length of sequences, `None` for streams
    pub fn len(&self) -> Option<usize> {
        match self {
            InputData::Sequence(values) => Some(values.len()),
            InputData::Stream(_) => None,
        }
    }

    pub fn has_len(&self) -> bool {
        self.len().is_some()
    }
}

impl fmt::Debug for InputData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputData::Sequence(values) => write!(f, "Sequence(len={})", values.len()),
            InputData::Stream(_) => f.write_str("Stream"),
        }
    }
}

pub type LoadDataFn = Arc<dyn Fn(RawData) -> Result<InputData> + Send + Sync>;
pub type LoadSampleFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Default `load_data`: lists become sequences and streams stay streams
pub fn default_load_data(raw: RawData) -> Result<InputData> {
    match raw {
        RawData::Value(Value::List(values)) => Ok(InputData::sequence(values)),
        RawData::Stream(source) => Ok(InputData::Stream(source)),
        RawData::Value(other) => Err(KindlingError::configuration_with(
            format!(
                "The default `load_data` expects a list or a stream, got {}. Provide a `load_data` hook.",
                other.kind()
            ),
            ["load_data"],
        )),
    }
}

/// `load_data`/`load_sample` overrides, generic or per stage
#[derive(Clone, Default)]
pub struct InputHooks {
    load_data: HookTable<InputHook, LoadDataFn>,
    load_sample: HookTable<InputHook, LoadSampleFn>,
}

impl InputHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_data<F>(mut self, f: F) -> Self
    where
        F: Fn(RawData) -> Result<InputData> + Send + Sync + 'static,
    {
        self.load_data.insert_unscoped(None, InputHook::LoadData, Arc::new(f));
        self
    }

    /// `{stage}_load_data`
    pub fn stage_load_data<F>(mut self, stage: RunningStage, f: F) -> Self
    where
        F: Fn(RawData) -> Result<InputData> + Send + Sync + 'static,
    {
        self.load_data.insert_unscoped(Some(stage), InputHook::LoadData, Arc::new(f));
        self
    }

    pub fn load_sample<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.load_sample.insert_unscoped(None, InputHook::LoadSample, Arc::new(f));
        self
    }

    /// `{stage}_load_sample`
    pub fn stage_load_sample<F>(mut self, stage: RunningStage, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.load_sample.insert_unscoped(Some(stage), InputHook::LoadSample, Arc::new(f));
        self
    }

    /// Name of the `load_data` hook in effect for `stage`
    pub fn resolved_load_data(&self, stage: RunningStage) -> String {
        self.load_data.resolve(InputHook::LoadData, None, stage).name.to_string()
    }

    /// Name of the `load_sample` hook in effect for `stage`
    pub fn resolved_load_sample(&self, stage: RunningStage) -> String {
        self.load_sample.resolve(InputHook::LoadSample, None, stage).name.to_string()
    }

    fn call_load_data(&self, stage: RunningStage, raw: RawData) -> Result<InputData> {
        let resolved = self.load_data.resolve(InputHook::LoadData, None, stage);
        match self.load_data.slot(&resolved.name) {
            HookSlot::Overridden(load_data) => {
                log::debug!("calling {} for stage {}", resolved.name, stage);
                load_data(raw)
            }
            HookSlot::Unset => default_load_data(raw),
        }
    }

    fn call_load_sample(&self, stage: RunningStage, sample: Value) -> Result<Value> {
        let resolved = self.load_sample.resolve(InputHook::LoadSample, None, stage);
        match self.load_sample.slot(&resolved.name) {
            HookSlot::Overridden(load_sample) => load_sample(sample),
            HookSlot::Unset => Ok(sample),
        }
    }
}

impl fmt::Debug for InputHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputHooks")
            .field("load_data", &self.load_data)
            .field("load_sample", &self.load_sample)
            .finish()
    }
}

/// State shared by both input variants
#[derive(Clone)]
pub struct InputBase {
    name: String,
    running_stage: RunningStage,
    hooks: InputHooks,
    data: Option<InputData>,
    /// Caller-supplied description of where the data came from, handed to
    /// `load_data` when a snapshot is reloaded
    source: Option<Value>,
}

impl InputBase {
    /// Run `load_data` on `raw` unless it is absent or null
    pub fn load(
        name: impl Into<String>,
        running_stage: RunningStage,
        hooks: InputHooks,
        raw: Option<RawData>,
    ) -> Result<Self> {
        let name = name.into();
        let data = match raw {
            Some(raw) if !raw.is_null() => Some(hooks.call_load_data(running_stage, raw)?),
            _ => None,
        };
        log::debug!(
            "loaded input '{}' for stage {}: {:?}",
            name,
            running_stage,
            data
        );
        Ok(Self {
            name,
            running_stage,
            hooks,
            data,
            source: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&Value> {
        self.source.as_ref()
    }

    pub fn running_stage(&self) -> RunningStage {
        self.running_stage
    }

    pub fn data(&self) -> Option<&InputData> {
        self.data.as_ref()
    }

    pub fn hooks(&self) -> &InputHooks {
        &self.hooks
    }

    /// Run the stage's `load_sample` on one raw sample
    pub fn call_load_sample(&self, sample: Value) -> Result<Value> {
        self.hooks.call_load_sample(self.running_stage, sample)
    }

    fn restaged(&self, running_stage: RunningStage) -> Self {
        Self {
            running_stage,
            ..self.clone()
        }
    }
}

impl fmt::Debug for InputBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBase")
            .field("name", &self.name)
            .field("running_stage", &self.running_stage)
            .field("data", &self.data)
            .finish()
    }
}

/// Which input variant a snapshot was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Map,
    Iterable,
}

/// Serializable description of an input without its loaded data or cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub name: String,
    pub running_stage: RunningStage,
    pub kind: InputKind,
    /// Provenance recorded with `with_source`; never the samples themselves
    pub source: Option<Value>,
    pub indices: Option<Vec<usize>>,
}

impl InputSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn expect_kind(&self, kind: InputKind) -> Result<()> {
        if self.kind != kind {
            return Err(KindlingError::configuration_with(
                format!(
                    "Snapshot of '{}' was taken from a {:?} input, not a {:?} one.",
                    self.name, self.kind, kind
                ),
                [self.name.clone()],
            ));
        }
        Ok(())
    }
}

/// Dataset with a length and indexed access
#[derive(Clone)]
pub struct Input {
    base: Arc<InputBase>,
    indices: Option<Arc<[usize]>>,
    transform: Option<Arc<InputTransform>>,
}

impl Input {
    /// Input with the default hooks
    pub fn new(running_stage: RunningStage, raw: Option<RawData>) -> Result<Self> {
        Self::with_hooks("Input", running_stage, InputHooks::new(), raw)
    }

    pub fn from_values(running_stage: RunningStage, values: Vec<Value>) -> Result<Self> {
        Self::new(running_stage, Some(RawData::from(values)))
    }

    pub fn with_hooks(
        name: impl Into<String>,
        running_stage: RunningStage,
        hooks: InputHooks,
        raw: Option<RawData>,
    ) -> Result<Self> {
        let input = Self {
            base: Arc::new(InputBase::load(name, running_stage, hooks, raw)?),
            indices: None,
            transform: None,
        };
        input.validate()?;
        Ok(input)
    }

    /// Loaded data must have a length
    pub fn validate(&self) -> Result<()> {
        match self.base.data() {
            Some(data) if !data.has_len() => Err(KindlingError::configuration_with(
                "`Input.data` is not a sequence with a defined length. Use `IterableInput` instead.",
                [self.base.name().to_string()],
            )),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn running_stage(&self) -> RunningStage {
        self.base.running_stage()
    }

    pub fn base(&self) -> &InputBase {
        &self.base
    }

    /// Number of samples; zero when no data was loaded
    pub fn len(&self) -> usize {
        match (&self.indices, self.base.data()) {
            (Some(indices), _) => indices.len(),
            (None, Some(data)) => data.len().unwrap_or(0),
            (None, None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw sample at `index` passed through `load_sample`
    pub fn get(&self, index: usize) -> Result<Value> {
        let position = match &self.indices {
            Some(indices) => indices.get(index).copied(),
            None => Some(index),
        };
        let sample = match (position, self.base.data()) {
            (Some(position), Some(InputData::Sequence(values))) => values.get(position).cloned(),
            _ => None,
        }
        .ok_or_else(|| {
            KindlingError::invalid_argument_op(
                "input_get",
                format!("index {} is out of range for '{}' of length {}", index, self.name(), self.len()),
            )
        })?;
        self.base.call_load_sample(sample)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Value>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// View over the samples at `indices`, sharing the loaded data
    pub fn subset(&self, indices: Vec<usize>) -> Result<Input> {
        let len = self.len();
        if let Some(bad) = indices.iter().find(|&&i| i >= len) {
            return Err(KindlingError::invalid_argument_op(
                "input_subset",
                format!("index {} is out of range for '{}' of length {}", bad, self.name(), len),
            ));
        }
        let mapped: Vec<usize> = match &self.indices {
            Some(current) => indices.iter().map(|&i| current[i]).collect(),
            None => indices,
        };
        Ok(Input {
            base: Arc::clone(&self.base),
            indices: Some(mapped.into()),
            transform: self.transform.clone(),
        })
    }

    /// The same data viewed from another stage; hooks and transform are re-resolved
    pub fn with_stage(&self, running_stage: RunningStage) -> Result<Input> {
        let transform = match &self.transform {
            Some(t) => Some(Arc::new(t.for_stage(running_stage)?)),
            None => None,
        };
        Ok(Input {
            base: Arc::new(self.base.restaged(running_stage)),
            indices: self.indices.clone(),
            transform,
        })
    }

    /// Attach the transform described by `config`
    pub fn with_transform(
        mut self,
        config: Option<TransformConfig>,
        pipeline_state: Option<Arc<PipelineState>>,
        registry: Option<&TransformRegistry>,
    ) -> Result<Self> {
        self.transform =
            create_transform(config, self.running_stage(), pipeline_state, registry)?.map(Arc::new);
        Ok(self)
    }

    pub fn set_transform(&mut self, transform: Option<Arc<InputTransform>>) {
        self.transform = transform;
    }

    pub fn transform(&self) -> Option<&Arc<InputTransform>> {
        self.transform.as_ref()
    }

    /// Record where the data came from, e.g. a path, so a snapshot can be
    /// reloaded through `load_data`
    pub fn with_source(mut self, source: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.base).source = Some(source.into());
        self
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            name: self.name().to_string(),
            running_stage: self.running_stage(),
            kind: InputKind::Map,
            source: self.base.source.clone(),
            indices: self.indices.as_ref().map(|i| i.to_vec()),
        }
    }

    /// Rebuild from a snapshot; with `reload` the recorded source is passed
    /// to `load_data` again, otherwise the input holds no data. A snapshot
    /// without a source always restores empty.
    pub fn from_snapshot(snapshot: &InputSnapshot, hooks: InputHooks, reload: bool) -> Result<Self> {
        snapshot.expect_kind(InputKind::Map)?;
        let base = if reload {
            InputBase::load(
                snapshot.name.clone(),
                snapshot.running_stage,
                hooks,
                snapshot.source.clone().map(RawData::Value),
            )?
        } else {
            InputBase {
                name: snapshot.name.clone(),
                running_stage: snapshot.running_stage,
                hooks,
                data: None,
                source: snapshot.source.clone(),
            }
        };
        let indices = match (&base.data, &snapshot.indices) {
            (Some(_), Some(indices)) => Some(Arc::from(indices.as_slice())),
            _ => None,
        };
        let input = Input {
            base: Arc::new(base),
            indices,
            transform: None,
        };
        input.validate()?;
        Ok(input)
    }

    /// Run `load_data` again from the recorded source, keeping hooks and transform
    pub fn reload(&self) -> Result<Input> {
        if self.base.source.is_none() {
            return Err(KindlingError::configuration_with(
                format!("'{}' has no recorded source to reload from. Use `with_source`.", self.name()),
                [self.name().to_string()],
            ));
        }
        let mut input = Self::from_snapshot(&self.snapshot(), self.base.hooks.clone(), true)?;
        input.transform = self.transform.clone();
        Ok(input)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("name", &self.name())
            .field("running_stage", &self.running_stage())
            .field("len", &self.len())
            .field("transform", &self.transform)
            .finish()
    }
}

/// Dataset without a length, consumed as a stream
pub struct IterableInput {
    base: Arc<InputBase>,
    transform: Option<Arc<InputTransform>>,
    data_iter: Option<SampleStream>,
}

impl IterableInput {
    pub fn new(running_stage: RunningStage, raw: Option<RawData>) -> Result<Self> {
        Self::with_hooks("IterableInput", running_stage, InputHooks::new(), raw)
    }

    pub fn with_hooks(
        name: impl Into<String>,
        running_stage: RunningStage,
        hooks: InputHooks,
        raw: Option<RawData>,
    ) -> Result<Self> {
        let input = Self {
            base: Arc::new(InputBase::load(name, running_stage, hooks, raw)?),
            transform: None,
            data_iter: None,
        };
        input.validate()?;
        Ok(input)
    }

    /// Loaded data must not have a length
    pub fn validate(&self) -> Result<()> {
        match self.base.data() {
            Some(data) if data.has_len() => Err(KindlingError::configuration_with(
                "`IterableInput.data` is a sequence with a defined length. Use `Input` instead.",
                [self.base.name().to_string()],
            )),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn running_stage(&self) -> RunningStage {
        self.base.running_stage()
    }

    pub fn base(&self) -> &InputBase {
        &self.base
    }

    /// Start a fresh pass over the data
    pub fn reset(&mut self) -> Result<()> {
        let stream: SampleStream = match self.base.data() {
            Some(InputData::Stream(source)) => source.open()?,
            Some(InputData::Sequence(_)) => {
                return Err(KindlingError::configuration(
                    "`IterableInput.data` is a sequence with a defined length. Use `Input` instead.",
                ))
            }
            None => Box::new(std::iter::empty()),
        };
        self.data_iter = Some(stream);
        Ok(())
    }

    pub fn with_transform(
        mut self,
        config: Option<TransformConfig>,
        pipeline_state: Option<Arc<PipelineState>>,
        registry: Option<&TransformRegistry>,
    ) -> Result<Self> {
        self.transform =
            create_transform(config, self.running_stage(), pipeline_state, registry)?.map(Arc::new);
        Ok(self)
    }

    pub fn set_transform(&mut self, transform: Option<Arc<InputTransform>>) {
        self.transform = transform;
    }

    pub fn transform(&self) -> Option<&Arc<InputTransform>> {
        self.transform.as_ref()
    }

    pub fn with_source(mut self, source: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.base).source = Some(source.into());
        self
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            name: self.name().to_string(),
            running_stage: self.running_stage(),
            kind: InputKind::Iterable,
            source: self.base.source.clone(),
            indices: None,
        }
    }

    /// Rebuild from a snapshot; streams are not serializable, so the input
    /// holds no data until one is attached again
    pub fn from_snapshot(snapshot: &InputSnapshot, hooks: InputHooks) -> Result<Self> {
        snapshot.expect_kind(InputKind::Iterable)?;
        Ok(Self {
            base: Arc::new(InputBase {
                name: snapshot.name.clone(),
                running_stage: snapshot.running_stage,
                hooks,
                data: None,
                source: snapshot.source.clone(),
            }),
            transform: None,
            data_iter: None,
        })
    }
}

impl Clone for IterableInput {
    /// Clones share the data but never the cursor
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            transform: self.transform.clone(),
            data_iter: None,
        }
    }
}

impl Iterator for IterableInput {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data_iter.is_none() {
            if let Err(err) = self.reset() {
                return Some(Err(err));
            }
        }
        let raw = self.data_iter.as_mut()?.next()?;
        Some(raw.and_then(|sample| self.base.call_load_sample(sample)))
    }
}

impl fmt::Debug for IterableInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterableInput")
            .field("name", &self.name())
            .field("running_stage", &self.running_stage())
            .field("transform", &self.transform)
            .field("iterating", &self.data_iter.is_some())
            .finish()
    }
}

/// Either input variant, as consumed by loaders and data modules
#[derive(Debug, Clone)]
pub enum InputSource {
    Map(Input),
    Iterable(IterableInput),
}

impl InputSource {
    pub fn name(&self) -> &str {
        match self {
            InputSource::Map(input) => input.name(),
            InputSource::Iterable(input) => input.name(),
        }
    }

    pub fn running_stage(&self) -> RunningStage {
        match self {
            InputSource::Map(input) => input.running_stage(),
            InputSource::Iterable(input) => input.running_stage(),
        }
    }

    /// Number of samples, `None` for iterable inputs
    pub fn len(&self) -> Option<usize> {
        match self {
            InputSource::Map(input) => Some(input.len()),
            InputSource::Iterable(_) => None,
        }
    }

    pub fn is_iterable(&self) -> bool {
        matches!(self, InputSource::Iterable(_))
    }

    pub fn transform(&self) -> Option<&Arc<InputTransform>> {
        match self {
            InputSource::Map(input) => input.transform(),
            InputSource::Iterable(input) => input.transform(),
        }
    }

    pub fn set_transform(&mut self, transform: Option<Arc<InputTransform>>) {
        match self {
            InputSource::Map(input) => input.set_transform(transform),
            InputSource::Iterable(input) => input.set_transform(transform),
        }
    }
}

impl From<Input> for InputSource {
    fn from(input: Input) -> Self {
        InputSource::Map(input)
    }
}

impl From<IterableInput> for InputSource {
    fn from(input: IterableInput) -> Self {
        InputSource::Iterable(input)
    }
}

/// Input over ready-made samples: a two element list is split into
/// `input`/`target`, anything else becomes the `input`
pub struct DatasetInput;

impl DatasetInput {
    pub fn hooks() -> InputHooks {
        InputHooks::new().load_sample(Self::load_sample)
    }

    pub fn new(running_stage: RunningStage, samples: Vec<Value>) -> Result<Input> {
        Input::with_hooks(
            "DatasetInput",
            running_stage,
            Self::hooks(),
            Some(RawData::from(samples)),
        )
    }

    pub fn load_sample(sample: Value) -> Result<Value> {
        Ok(match sample {
            Value::List(mut pair) if pair.len() == 2 => {
                let target = pair.pop().unwrap_or_default();
                let input = pair.pop().unwrap_or_default();
                Value::map([(DataKeys::INPUT, input), (DataKeys::TARGET, target)])
            }
            other => Value::map([(DataKeys::INPUT, other)]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(n: i64) -> Vec<Value> {
        (0..n).map(Value::Int).collect()
    }

    fn generator(n: i64) -> RawData {
        RawData::stream(move || (0..n).map(Value::Int))
    }

    #[test]
    fn test_input_requires_length() {
        assert!(Input::from_values(RunningStage::Training, numbers(3)).is_ok());

        let err = Input::new(RunningStage::Training, Some(generator(3))).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Use `IterableInput` instead"));
    }

    #[test]
    fn test_iterable_input_rejects_length() {
        assert!(IterableInput::new(RunningStage::Training, Some(generator(3))).is_ok());

        let err = IterableInput::new(RunningStage::Training, Some(RawData::from(numbers(3)))).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Use `Input` instead"));
    }

    #[test]
    fn test_load_data_skipped_without_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hooks = InputHooks::new().load_data(move |raw| {
            counter.fetch_add(1, Ordering::SeqCst);
            default_load_data(raw)
        });
        let empty = Input::with_hooks("empty", RunningStage::Testing, hooks.clone(), None).unwrap();
        assert_eq!(empty.len(), 0);
        let null = Input::with_hooks("null", RunningStage::Testing, hooks.clone(), Some(Value::Null.into())).unwrap();
        assert!(null.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        Input::with_hooks("full", RunningStage::Testing, hooks, Some(RawData::from(numbers(2)))).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stage_specific_load_hooks() {
        let hooks = InputHooks::new()
            .load_data(|_raw| Ok(InputData::sequence(vec![Value::from("generic")])))
            .stage_load_data(RunningStage::Predicting, |_raw| {
                Ok(InputData::sequence(vec![Value::from("predict")]))
            })
            .stage_load_sample(RunningStage::Predicting, |sample| {
                Ok(Value::map([("input", sample)]))
            });
        assert_eq!(hooks.resolved_load_data(RunningStage::Predicting), "predict_load_data");
        assert_eq!(hooks.resolved_load_data(RunningStage::Training), "load_data");

        let raw = Some(RawData::from(Value::from("folder")));
        let predict = Input::with_hooks("p", RunningStage::Predicting, hooks.clone(), raw.clone()).unwrap();
        assert_eq!(predict.get(0).unwrap(), Value::map([("input", "predict")]));

        let train = Input::with_hooks("t", RunningStage::Training, hooks, raw).unwrap();
        assert_eq!(train.get(0).unwrap(), Value::from("generic"));
    }

    #[test]
    fn test_get_out_of_range() {
        let input = Input::from_values(RunningStage::Validating, numbers(2)).unwrap();
        assert!(input.get(2).is_err());
        let collected: Result<Vec<_>> = input.iter().collect();
        assert_eq!(collected.unwrap(), numbers(2));
    }

    #[test]
    fn test_subset_shares_data() {
        let input = Input::from_values(RunningStage::Training, numbers(5)).unwrap();
        let subset = input.subset(vec![4, 1, 3]).unwrap();
        assert_eq!(subset.len(), 3);
        assert_eq!(subset.get(0).unwrap(), Value::Int(4));
        let nested = subset.subset(vec![2]).unwrap();
        assert_eq!(nested.get(0).unwrap(), Value::Int(3));
        assert!(input.subset(vec![5]).is_err());
    }

    #[test]
    fn test_iterable_input_iterates_and_resets() {
        let hooks = InputHooks::new().load_sample(|s| Ok(Value::Int(s.as_int().unwrap_or_default() * 10)));
        let mut input = IterableInput::with_hooks("stream", RunningStage::Training, hooks, Some(generator(3))).unwrap();
        let first: Vec<Value> = input.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(first, vec![Value::Int(0), Value::Int(10), Value::Int(20)]);
        assert!(input.next().is_none());

        input.reset().unwrap();
        assert_eq!(input.next().map(|r| r.unwrap()), Some(Value::Int(0)));

        let fresh = input.clone();
        assert_eq!(fresh.count(), 3);
    }

    #[test]
    fn test_load_sample_errors_are_distinct_from_exhaustion() {
        let hooks = InputHooks::new().load_sample(|s| match s.as_int() {
            Some(1) => Err(KindlingError::transform("load_sample", "corrupt sample")),
            _ => Ok(s),
        });
        let mut input = IterableInput::with_hooks("s", RunningStage::Training, hooks, Some(generator(3))).unwrap();
        assert!(matches!(input.next(), Some(Ok(_))));
        assert!(matches!(input.next(), Some(Err(_))));
        assert!(matches!(input.next(), Some(Ok(_))));
        assert!(input.next().is_none());
    }

    /// `load_data` that reads a sample count instead of a list
    fn counted() -> InputHooks {
        InputHooks::new().load_data(|raw| match raw {
            RawData::Value(Value::Int(n)) => Ok(InputData::sequence(numbers(n))),
            other => default_load_data(other),
        })
    }

    #[test]
    fn test_snapshot_strips_data() {
        let input = Input::with_hooks("counted", RunningStage::Training, counted(), Some(Value::Int(4).into()))
            .unwrap()
            .with_source(4)
            .subset(vec![1, 2])
            .unwrap();
        let json = input.snapshot().to_json().unwrap();
        let snapshot = InputSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot.source, Some(Value::Int(4)));

        let restored = Input::from_snapshot(&snapshot, counted(), false).unwrap();
        assert!(restored.base().data().is_none());
        assert_eq!(restored.len(), 0);

        let reloaded = Input::from_snapshot(&snapshot, counted(), true).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(0).unwrap(), Value::Int(1));

        assert!(IterableInput::from_snapshot(&snapshot, counted()).is_err());

        let again = reloaded.reload().unwrap();
        assert_eq!(again.iter().collect::<Result<Vec<_>>>().unwrap(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_snapshot_never_holds_samples() {
        let samples: Vec<Value> = (0..1000).map(|i| Value::from(format!("sample-{}", i))).collect();
        let input = Input::from_values(RunningStage::Training, samples).unwrap();
        let snapshot = input.snapshot();
        assert!(snapshot.source.is_none());
        assert!(input.base().source().is_none());

        let json = snapshot.to_json().unwrap();
        assert!(!json.contains("sample-"));
        assert!(json.len() < 200);

        let err = input.reload().unwrap_err();
        assert!(err.is_configuration());

        let val = input.with_stage(RunningStage::Validating).unwrap();
        match (input.base().data(), val.base().data()) {
            (Some(InputData::Sequence(a)), Some(InputData::Sequence(b))) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("expected shared sequences, got {:?}", other),
        }
    }

    #[test]
    fn test_iterable_snapshot_restores_without_cursor() {
        let mut input = IterableInput::new(RunningStage::Testing, Some(generator(2))).unwrap();
        input.next();
        let snapshot = input.snapshot();
        assert!(snapshot.source.is_none());
        let mut restored = IterableInput::from_snapshot(&snapshot, InputHooks::new()).unwrap();
        assert!(restored.next().is_none());
    }

    #[test]
    fn test_dataset_input_pairs() {
        let input = DatasetInput::new(
            RunningStage::Training,
            vec![Value::list([1, 0]), Value::from(5)],
        )
        .unwrap();
        assert_eq!(input.get(0).unwrap(), Value::map([("input", 1), ("target", 0)]));
        assert_eq!(input.get(1).unwrap(), Value::map([("input", 5)]));
    }

    #[test]
    fn test_with_stage_re_resolves_load_sample() {
        let hooks = InputHooks::new().stage_load_sample(RunningStage::Validating, |_s| Ok(Value::from("val")));
        let train = Input::with_hooks("x", RunningStage::Training, hooks, Some(RawData::from(numbers(1)))).unwrap();
        assert_eq!(train.get(0).unwrap(), Value::Int(0));
        let val = train.with_stage(RunningStage::Validating).unwrap();
        assert_eq!(val.get(0).unwrap(), Value::from("val"));
    }
}
