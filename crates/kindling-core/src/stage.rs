//! Running Stages
//!
//! The four mutually exclusive stages a pipeline can run in. A stage is fixed
//! for the lifetime of an input or transform and selects which hook
//! specializations are eligible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{KindlingError, Result};

/// Pipeline stage selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningStage {
    Training,
    Validating,
    Testing,
    Predicting,
}

impl RunningStage {
    /// Every stage, in hook-resolution order
    pub const ALL: [RunningStage; 4] = [
        RunningStage::Training,
        RunningStage::Validating,
        RunningStage::Testing,
        RunningStage::Predicting,
    ];

    /// Prefix used in stage-specialized hook names (`train`, `val`, `test`, `predict`)
    pub fn prefix(self) -> &'static str {
        match self {
            RunningStage::Training => "train",
            RunningStage::Validating => "val",
            RunningStage::Testing => "test",
            RunningStage::Predicting => "predict",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.prefix() == prefix)
    }

    pub fn is_training(self) -> bool {
        self == RunningStage::Training
    }
}

impl fmt::Display for RunningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunningStage::Training => "training",
            RunningStage::Validating => "validating",
            RunningStage::Testing => "testing",
            RunningStage::Predicting => "predicting",
        };
        f.write_str(name)
    }
}

impl FromStr for RunningStage {
    type Err = KindlingError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.to_string() == lowered || stage.prefix() == lowered)
            .ok_or_else(|| KindlingError::configuration_with(format!("Unknown stage '{s}'"), [s]))
    }
}
