//! Core configuration types

use crate::dataloader::DataLoaderConfig;
use crate::transforms::TransformConfig;
use kindling_core::{Result, RunningStage};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Settings for a [`DataModule`](crate::datamodule::DataModule)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataModuleConfig {
    pub batch_size: usize,
    pub num_workers: usize,
    /// Fraction of the train input moved to validation
    pub val_split: Option<f64>,
    /// Seed for the validation split and train shuffling
    pub seed: Option<u64>,
    pub pin_memory: bool,
    pub persistent_workers: bool,
    pub prefetch_factor: usize,
    pub timeout_secs: Option<u64>,
    pub transforms: StageTransforms,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            num_workers: 0,
            val_split: None,
            seed: None,
            pin_memory: false,
            persistent_workers: false,
            prefetch_factor: 2,
            timeout_secs: None,
            transforms: StageTransforms::default(),
        }
    }
}

impl DataModuleConfig {
    /// Loader settings shared by every stage; `drop_last` is decided per stage
    pub fn dataloader_config(&self) -> DataLoaderConfig {
        DataLoaderConfig {
            batch_size: self.batch_size,
            num_workers: self.num_workers,
            prefetch_factor: self.prefetch_factor,
            drop_last: false,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Registry transform specifications per stage, each `"name"`, `["name"]`
/// or `["name", {kwargs}]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTransforms {
    pub train: Option<JsonValue>,
    pub val: Option<JsonValue>,
    pub test: Option<JsonValue>,
    pub predict: Option<JsonValue>,
}

impl StageTransforms {
    pub fn for_stage(&self, stage: RunningStage) -> Option<&JsonValue> {
        match stage {
            RunningStage::Training => self.train.as_ref(),
            RunningStage::Validating => self.val.as_ref(),
            RunningStage::Testing => self.test.as_ref(),
            RunningStage::Predicting => self.predict.as_ref(),
        }
    }

    /// Parsed transform configuration for `stage`
    pub fn transform_config(&self, stage: RunningStage) -> Result<Option<TransformConfig>> {
        match self.for_stage(stage) {
            Some(spec) => TransformConfig::from_json(spec),
            None => Ok(None),
        }
    }
}
