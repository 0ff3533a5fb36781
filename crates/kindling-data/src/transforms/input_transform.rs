//! Input Transforms
//!
//! An [`InputTransform`] is bound to one [`RunningStage`] and resolves, once at
//! construction, which registered hooks apply at each [`HookPlacement`]:
//!
//! * for every placement and key prefix the plain hook and its key-scoped form
//!   are selected through [`HookTable::select`];
//! * key-scoped hooks are wrapped in [`ApplyToKeys`];
//! * several hooks at one placement are chained with [`Compose`] in key prefix
//!   order, a single hook is used directly, and placements without hooks are
//!   absent from the resolved map (identity).
//!
//! `per_batch_transform` and `per_sample_transform_on_device` are mutually
//! exclusive: batching must happen either in the loader worker or after the
//! transfer to the device, and which one is decided here.

use super::{ApplyToKeys, Compose, SharedTransform, Transform};
use crate::collate::DefaultCollate;
use crate::hooks::{HookName, HookPlacement, HookSlot, HookTable, KeyPrefix};
use indexmap::{IndexMap, IndexSet};
use kindling_core::{KindlingError, Result, RunningStage, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Transform overrides keyed by hook name
pub type TransformHooks = HookTable<HookPlacement, SharedTransform>;

impl TransformHooks {
    /// Register `transform` under the textual hook name `name`
    pub fn with<T: Transform + 'static>(self, name: &str, transform: T) -> Result<Self> {
        self.hook(name, Arc::new(transform))
    }
}

/// State shared between a model and the pipelines feeding it
#[derive(Default)]
pub struct PipelineState {
    collate_fn: RwLock<Option<SharedTransform>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a collate function that takes precedence over every collate hook
    pub fn set_collate_fn(&self, collate: SharedTransform) {
        *self
            .collate_fn
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(collate);
    }

    pub fn clear_collate_fn(&self) {
        *self
            .collate_fn
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn collate_fn(&self) -> Option<SharedTransform> {
        self.collate_fn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("collate_fn", &self.collate_fn().map(|c| c.describe()))
            .finish()
    }
}

/// Registry entry a transform was built from, enough to rebuild it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformProvenance {
    pub name: String,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

/// Serializable configuration of an [`InputTransform`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTransformState {
    pub running_stage: RunningStage,
    pub provenance: Option<TransformProvenance>,
    /// Resolved hook names per placement
    pub hooks: IndexMap<String, Vec<String>>,
    pub collate_in_worker: Option<bool>,
}

impl InputTransformState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone)]
struct ResolvedTransform {
    names: Vec<String>,
    transform: SharedTransform,
}

/// Stage-bound set of resolved transforms
#[derive(Clone)]
pub struct InputTransform {
    running_stage: RunningStage,
    hooks: Arc<TransformHooks>,
    resolved: IndexMap<HookPlacement, ResolvedTransform>,
    collate_in_worker: Option<bool>,
    pipeline_state: Option<Arc<PipelineState>>,
    provenance: Option<TransformProvenance>,
}

impl InputTransform {
    /// Transform without any overrides: every placement is the identity
    pub fn new(running_stage: RunningStage) -> Self {
        Self {
            running_stage,
            hooks: Arc::new(TransformHooks::new()),
            resolved: IndexMap::new(),
            collate_in_worker: None,
            pipeline_state: None,
            provenance: None,
        }
    }

    /// Resolve and validate `hooks` for `running_stage`
    pub fn from_hooks(running_stage: RunningStage, hooks: impl Into<Arc<TransformHooks>>) -> Result<Self> {
        let hooks = hooks.into();
        let resolved = resolve_transforms(&hooks, running_stage)?;
        let collate_in_worker = check_transforms(&resolved, running_stage)?;
        log::debug!(
            "resolved input transform for stage {}: {:?}",
            running_stage,
            resolved
                .iter()
                .map(|(p, r)| (p.as_str(), r.names.clone()))
                .collect::<Vec<_>>()
        );
        Ok(Self {
            running_stage,
            hooks,
            resolved,
            collate_in_worker,
            pipeline_state: None,
            provenance: None,
        })
    }

    /// Build from a placement name → transform mapping
    pub fn from_overrides<I, S>(running_stage: RunningStage, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, SharedTransform)>,
        S: AsRef<str>,
    {
        let overrides: Vec<(String, SharedTransform)> = overrides
            .into_iter()
            .map(|(name, t)| (name.as_ref().to_string(), t))
            .collect();

        let unknown: Vec<String> = overrides
            .iter()
            .filter(|(name, _)| name.parse::<HookPlacement>().is_err())
            .map(|(name, _)| name.clone())
            .collect();
        if !unknown.is_empty() {
            return Err(KindlingError::configuration_with(
                format!(
                    "{}_transform contains {:?}. Only {:?} keys are supported.",
                    running_stage.prefix(),
                    unknown,
                    HookPlacement::ALL.map(HookPlacement::as_str)
                ),
                unknown,
            ));
        }

        let declares = |placement: HookPlacement| overrides.iter().any(|(n, _)| n == placement.as_str());
        if declares(HookPlacement::PerBatchTransform)
            && declares(HookPlacement::PerSampleTransformOnDevice)
        {
            return Err(mutually_exclusive(running_stage));
        }

        let mut hooks = TransformHooks::new();
        for (name, transform) in overrides {
            let placement: HookPlacement = name.parse()?;
            hooks.insert(HookName::generic(placement), transform)?;
        }
        Self::from_hooks(running_stage, hooks)
    }

    /// A single callable applied as `per_sample_transform`
    pub fn from_callable(running_stage: RunningStage, transform: SharedTransform) -> Result<Self> {
        Self::from_overrides(running_stage, [(HookPlacement::PerSampleTransform.as_str(), transform)])
    }

    /// The same hooks resolved for another stage
    pub fn for_stage(&self, running_stage: RunningStage) -> Result<Self> {
        if running_stage == self.running_stage {
            return Ok(self.clone());
        }
        let mut restaged = Self::from_hooks(running_stage, Arc::clone(&self.hooks))?;
        restaged.pipeline_state = self.pipeline_state.clone();
        restaged.provenance = self.provenance.clone();
        Ok(restaged)
    }

    pub fn with_pipeline_state(mut self, state: Arc<PipelineState>) -> Self {
        self.pipeline_state = Some(state);
        self
    }

    pub fn with_provenance(mut self, provenance: TransformProvenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn running_stage(&self) -> RunningStage {
        self.running_stage
    }

    pub fn hooks(&self) -> &TransformHooks {
        &self.hooks
    }

    pub fn pipeline_state(&self) -> Option<&Arc<PipelineState>> {
        self.pipeline_state.as_ref()
    }

    pub fn provenance(&self) -> Option<&TransformProvenance> {
        self.provenance.as_ref()
    }

    /// `Some(true)` when batches are built in the loader worker, `Some(false)`
    /// when they are built on device, `None` when nothing forces either
    pub fn collate_in_worker(&self) -> Option<bool> {
        self.collate_in_worker
    }

    /// Resolved transform for `placement`, `None` meaning identity
    pub fn get(&self, placement: HookPlacement) -> Option<&SharedTransform> {
        self.resolved.get(&placement).map(|r| &r.transform)
    }

    /// Hook names composed at `placement`, in application order
    pub fn hook_names(&self, placement: HookPlacement) -> &[String] {
        self.resolved
            .get(&placement)
            .map(|r| r.names.as_slice())
            .unwrap_or_default()
    }

    /// Placements with at least one resolved hook
    pub fn placements(&self) -> Vec<HookPlacement> {
        self.resolved.keys().copied().collect()
    }

    pub fn is_identity(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Apply the transform resolved at `placement` to `value` as a whole
    pub fn apply(&self, placement: HookPlacement, value: Value) -> Result<Value> {
        match self.resolved.get(&placement) {
            Some(resolved) => resolved.transform.apply(value),
            None => Ok(value),
        }
    }

    pub fn per_sample_transform(&self, sample: Value) -> Result<Value> {
        self.apply(HookPlacement::PerSampleTransform, sample)
    }

    pub fn per_batch_transform(&self, batch: Value) -> Result<Value> {
        self.apply(HookPlacement::PerBatchTransform, batch)
    }

    pub fn per_sample_transform_on_device(&self, sample: Value) -> Result<Value> {
        self.apply(HookPlacement::PerSampleTransformOnDevice, sample)
    }

    pub fn per_batch_transform_on_device(&self, batch: Value) -> Result<Value> {
        self.apply(HookPlacement::PerBatchTransformOnDevice, batch)
    }

    /// The collate function in effect: a pipeline-state override, then the
    /// resolved collate hook, then [`DefaultCollate`]
    pub fn collate_fn(&self) -> SharedTransform {
        if let Some(collate) = self.pipeline_state.as_ref().and_then(|s| s.collate_fn()) {
            return collate;
        }
        match self.resolved.get(&HookPlacement::Collate) {
            Some(resolved) => Arc::clone(&resolved.transform),
            None => Arc::new(DefaultCollate),
        }
    }

    /// Merge `samples` into one batch, passing `metadata` only to collate
    /// functions that accept it
    pub fn collate(&self, samples: Vec<Value>, metadata: Option<Value>) -> Result<Value> {
        let collate = self.collate_fn();
        if collate.accepts_metadata() {
            collate.apply_with_metadata(Value::List(samples), metadata)
        } else {
            collate.apply(Value::List(samples))
        }
    }

    pub fn get_state_dict(&self) -> InputTransformState {
        InputTransformState {
            running_stage: self.running_stage,
            provenance: self.provenance.clone(),
            hooks: self
                .resolved
                .iter()
                .map(|(placement, r)| (placement.as_str().to_string(), r.names.clone()))
                .collect(),
            collate_in_worker: self.collate_in_worker,
        }
    }

    /// Rebuild a transform from [`InputTransform::get_state_dict`] output
    pub fn load_state_dict(
        state: &InputTransformState,
        registry: Option<&super::TransformRegistry>,
    ) -> Result<Self> {
        let rebuilt = match &state.provenance {
            None if state.hooks.is_empty() => InputTransform::new(state.running_stage),
            None => {
                let names: Vec<String> = state.hooks.values().flatten().cloned().collect();
                return Err(KindlingError::configuration_with(
                    "The state dict holds resolved hooks but no registry provenance to rebuild them from.",
                    names,
                ));
            }
            Some(provenance) => {
                let registry = registry.filter(|r| !r.is_empty()).ok_or_else(|| {
                    KindlingError::lookup("input_transforms", &provenance.name, Vec::<String>::new())
                })?;
                let factory = registry.get(&provenance.name)?;
                let hooks = factory(&provenance.kwargs)?;
                InputTransform::from_hooks(state.running_stage, hooks)?
                    .with_provenance(provenance.clone())
            }
        };

        let reloaded = rebuilt.get_state_dict();
        if reloaded.hooks != state.hooks || reloaded.collate_in_worker != state.collate_in_worker {
            let mut differing: Vec<String> = state.hooks.keys().cloned().collect();
            differing.extend(reloaded.hooks.keys().cloned());
            differing.sort();
            differing.dedup();
            return Err(KindlingError::configuration_with(
                format!(
                    "Rebuilt transform does not match the state dict: expected {:?}, got {:?}",
                    state.hooks, reloaded.hooks
                ),
                differing,
            ));
        }
        Ok(rebuilt)
    }
}

impl fmt::Debug for InputTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputTransform")
            .field("running_stage", &self.running_stage)
            .field(
                "transform",
                &self
                    .resolved
                    .iter()
                    .map(|(p, r)| (p.as_str(), r.transform.describe()))
                    .collect::<IndexMap<_, _>>(),
            )
            .field("collate_in_worker", &self.collate_in_worker)
            .finish()
    }
}

fn resolve_transforms(
    hooks: &TransformHooks,
    stage: RunningStage,
) -> Result<IndexMap<HookPlacement, ResolvedTransform>> {
    let mut resolved = IndexMap::new();

    for placement in HookPlacement::ALL {
        let mut names: Vec<String> = Vec::new();
        let mut transforms: Vec<SharedTransform> = Vec::new();

        for key in KeyPrefix::ALL {
            let chosen = hooks.select(placement, key, stage)?;
            let name = chosen.name.to_string();
            if names.contains(&name) {
                continue;
            }
            let HookSlot::Overridden(transform) = hooks.slot(&chosen.name) else {
                continue;
            };
            let transform = match chosen.name.key {
                Some(key) => Arc::new(ApplyToKeys::new(key.data_key(), Arc::clone(transform))) as SharedTransform,
                None => Arc::clone(transform),
            };
            names.push(name);
            transforms.push(transform);
        }

        let transform = match transforms.len() {
            0 => continue,
            1 => transforms.remove(0),
            _ => Arc::new(Compose::from_transforms(transforms)) as SharedTransform,
        };
        resolved.insert(placement, ResolvedTransform { names, transform });
    }

    Ok(resolved)
}

fn check_transforms(
    resolved: &IndexMap<HookPlacement, ResolvedTransform>,
    stage: RunningStage,
) -> Result<Option<bool>> {
    let per_batch = resolved.contains_key(&HookPlacement::PerBatchTransform);
    let on_device = resolved.contains_key(&HookPlacement::PerSampleTransformOnDevice);

    match (per_batch, on_device) {
        (true, true) => {
            let mut offending: IndexSet<String> = IndexSet::new();
            for placement in [
                HookPlacement::PerBatchTransform,
                HookPlacement::PerSampleTransformOnDevice,
            ] {
                offending.insert(placement.as_str().to_string());
                if let Some(r) = resolved.get(&placement) {
                    offending.extend(r.names.iter().cloned());
                }
            }
            Err(KindlingError::configuration_with(
                format!(
                    "`per_batch_transform` and `per_sample_transform_on_device` are mutually exclusive for stage {}",
                    stage
                ),
                offending,
            ))
        }
        (true, false) => Ok(Some(true)),
        (false, true) => Ok(Some(false)),
        (false, false) => Ok(None),
    }
}

pub(crate) fn mutually_exclusive(stage: RunningStage) -> KindlingError {
    KindlingError::configuration_with(
        format!(
            "`per_batch_transform` and `per_sample_transform_on_device` are mutually exclusive for stage {}",
            stage
        ),
        [
            HookPlacement::PerBatchTransform.as_str(),
            HookPlacement::PerSampleTransformOnDevice.as_str(),
        ],
    )
}
