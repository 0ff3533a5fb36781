//! Processors
//!
//! The runtime glue between an [`InputTransform`] and a loader. Each stage gets
//! two processors: a worker-side one (per-sample, collate, per-batch) that runs
//! while loading, and a device-side one (per-sample and per-batch on device)
//! that runs after the batch has been transferred. Exactly one of them
//! collates, depending on whether per-sample work is requested on device.

use crate::callback::{CallbackSet, PipelineCallback};
use crate::hooks::HookPlacement;
use crate::transforms::input_transform::mutually_exclusive;
use crate::transforms::InputTransform;
use kindling_core::{DataKeys, Result, RunningStage, Value};
use std::sync::Arc;

/// Which collate a processor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateSlot {
    /// Samples pass through as a list
    Identity,
    /// The transform's effective collate function
    Collate,
}

/// Collate slots for the (worker, device) processors
pub fn make_collates(on_device: bool) -> (CollateSlot, CollateSlot) {
    if on_device {
        (CollateSlot::Identity, CollateSlot::Collate)
    } else {
        (CollateSlot::Collate, CollateSlot::Identity)
    }
}

/// Runs one side of a stage's transform pipeline
#[derive(Debug, Clone)]
pub struct InputTransformProcessor {
    transform: Arc<InputTransform>,
    collate: CollateSlot,
    per_sample: HookPlacement,
    per_batch: HookPlacement,
    apply_per_sample_transform: bool,
    on_device: bool,
    callbacks: CallbackSet,
}

impl InputTransformProcessor {
    pub fn new(
        transform: Arc<InputTransform>,
        collate: CollateSlot,
        on_device: bool,
        apply_per_sample_transform: bool,
        callbacks: CallbackSet,
    ) -> Self {
        let (per_sample, per_batch) = if on_device {
            (
                HookPlacement::PerSampleTransformOnDevice,
                HookPlacement::PerBatchTransformOnDevice,
            )
        } else {
            (
                HookPlacement::PerSampleTransform,
                HookPlacement::PerBatchTransform,
            )
        };
        Self {
            transform,
            collate,
            per_sample,
            per_batch,
            apply_per_sample_transform,
            on_device,
            callbacks,
        }
    }

    pub fn running_stage(&self) -> RunningStage {
        self.transform.running_stage()
    }

    pub fn transform(&self) -> &Arc<InputTransform> {
        &self.transform
    }

    pub fn collate_slot(&self) -> CollateSlot {
        self.collate
    }

    pub fn is_on_device(&self) -> bool {
        self.on_device
    }

    pub fn applies_per_sample_transform(&self) -> bool {
        self.apply_per_sample_transform
    }

    /// Transform a list of samples (or an already built batch) into a batch
    pub fn process(&self, samples: Value) -> Result<Value> {
        let stage = self.running_stage();

        if !self.on_device {
            match &samples {
                Value::List(items) => items
                    .iter()
                    .for_each(|s| self.callbacks.on_load_sample(s, stage)),
                other => self.callbacks.on_load_sample(other, stage),
            }
        }

        let batch = if self.apply_per_sample_transform {
            let samples = match samples {
                Value::List(items) => items,
                other => vec![other],
            };
            let transformed = samples
                .into_iter()
                .map(|sample| self.transform.apply(self.per_sample, sample))
                .collect::<Result<Vec<_>>>()?;
            for sample in &transformed {
                if self.on_device {
                    self.callbacks.on_per_sample_transform_on_device(sample, stage);
                } else {
                    self.callbacks.on_per_sample_transform(sample, stage);
                }
            }

            let batch = match self.collate {
                CollateSlot::Identity => Value::List(transformed),
                CollateSlot::Collate => {
                    let (samples, metadata) = extract_metadata(transformed);
                    let mut batch = self.transform.collate(samples, metadata.clone())?;
                    if let (Some(metadata), Value::Map(map)) = (metadata, &mut batch) {
                        map.insert(DataKeys::METADATA.to_string(), metadata);
                    }
                    batch
                }
            };
            self.callbacks.on_collate(&batch, stage);
            batch
        } else {
            samples
        };

        let batch = self.transform.apply(self.per_batch, batch)?;
        if self.on_device {
            self.callbacks.on_per_batch_transform_on_device(&batch, stage);
        } else {
            self.callbacks.on_per_batch_transform(&batch, stage);
        }
        Ok(batch)
    }
}

/// Pop the metadata entry of every mapping sample; `None` when no sample has any
fn extract_metadata(samples: Vec<Value>) -> (Vec<Value>, Option<Value>) {
    let mut metadata = Vec::with_capacity(samples.len());
    let samples = samples
        .into_iter()
        .map(|mut sample| {
            let entry = sample
                .as_map_mut()
                .and_then(|map| map.shift_remove(DataKeys::METADATA))
                .unwrap_or(Value::Null);
            metadata.push(entry);
            sample
        })
        .collect();
    if metadata.iter().all(Value::is_null) {
        (samples, None)
    } else {
        (samples, Some(Value::List(metadata)))
    }
}

/// Build the (worker, device) processor pair for `transform`
pub fn create_processors(
    transform: Arc<InputTransform>,
    callbacks: CallbackSet,
) -> Result<(InputTransformProcessor, InputTransformProcessor)> {
    let stage = transform.running_stage();
    let hooks = transform.hooks();
    let per_batch_overridden = hooks.is_overridden_recursive(HookPlacement::PerBatchTransform, stage);
    let on_device_overridden =
        hooks.is_overridden_recursive(HookPlacement::PerSampleTransformOnDevice, stage);

    let on_device = match transform.collate_in_worker() {
        Some(collate_in_worker) => !collate_in_worker,
        None if per_batch_overridden && on_device_overridden => {
            return Err(mutually_exclusive(stage));
        }
        None => on_device_overridden,
    };
    let (worker_collate, device_collate) = make_collates(on_device);
    log::debug!(
        "stage {}: collating {}",
        stage,
        if on_device { "on device" } else { "in worker" }
    );

    let worker = InputTransformProcessor::new(
        Arc::clone(&transform),
        worker_collate,
        false,
        true,
        callbacks.clone(),
    );
    let device = InputTransformProcessor::new(
        transform,
        device_collate,
        true,
        device_collate != CollateSlot::Identity,
        callbacks,
    );
    Ok((worker, device))
}
