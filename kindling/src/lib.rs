//! # kindling
//!
//! Stage-aware data pipelines for model training and inference.
//!
//! A pipeline is described by hooks named `{stage_}{key_}{base}`, such as
//! `train_input_per_sample_transform`. For each running stage the most
//! specific overridden hook wins, hooks scoped to `input_`/`target_` only
//! touch that sample key, and the result is an [`InputTransform`] with one
//! callable per placement. Inputs load raw data once and samples on demand;
//! data loaders batch them through the worker-side processor and
//! [`DataModule::on_after_batch_transfer`] finishes the device-side work.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kindling::prelude::*;
//!
//! # fn main() -> Result<(), KindlingError> {
//! let hooks = TransformHooks::new().hook(
//!     "train_input_per_sample_transform",
//!     shared(|v: Value| -> Result<Value, KindlingError> {
//!         Ok(Value::Int(v.as_int().unwrap_or_default() + 1))
//!     }),
//! )?;
//!
//! let train = DatasetInput::new(RunningStage::Training, vec![Value::list([1, 0]), Value::list([2, 1])])?
//!     .with_transform(Some(hooks.into()), None, None)?;
//!
//! let datamodule = DataModule::builder().batch_size(2).train_input(train).build()?;
//! if let Some(loader) = datamodule.train_dataloader()? {
//!     for batch in loader.iter() {
//!         let batch = datamodule.on_after_batch_transfer(batch?, RunningStage::Training)?;
//!         println!("{:?}", batch);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use kindling_core as core;
pub use kindling_data as data;

pub use kindling_core::{DataKeys, DType, KindlingError, Registry, Result, RunningStage, Sample, Tensor, Value};
pub use kindling_data::*;

/// Version of the kindling crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    // Core types
    pub use kindling_core::{DataKeys, KindlingError, RunningStage, Sample, Tensor, Value};

    // Hooks and transforms
    pub use kindling_data::hooks::{HookPlacement, KeyPrefix};
    pub use kindling_data::transforms::{
        create_transform, factory, shared, ApplyToKeys, Compose, InputTransform, PipelineState,
        SharedTransform, Transform, TransformConfig, TransformHooks, TransformRegistry, WithMetadata,
    };

    // Inputs
    pub use kindling_data::input::{DatasetInput, Input, InputData, InputHooks, IterableInput, RawData};

    // Loading
    pub use kindling_data::collate::{default_collate, default_uncollate};
    pub use kindling_data::dataloader::{DataLoader, DataLoaderBuilder, RandomSampler, SequentialSampler};
    pub use kindling_data::datamodule::DataModule;

    // Configuration
    pub use kindling_data::config::{ConfigManager, DataModuleConfig};

    // Callbacks
    pub use kindling_data::callback::{BaseDataFetcher, PipelineCallback};
}
