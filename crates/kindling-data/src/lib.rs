//! # kindling-data
//!
//! Stage-aware data pipelines. Hooks are registered under names of the form
//! `{stage_}{key_}{base}` and resolved per [`RunningStage`] into an
//! [`InputTransform`]; inputs produce samples through a
//! `load_data`/`load_sample` pair; processors run the resolved transform in
//! the loader workers and after device transfer; a [`DataModule`] ties the
//! four stages together.
//!
//! [`RunningStage`]: kindling_core::RunningStage

#![warn(unsafe_code)]
#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]

pub mod callback;
pub mod collate;
pub mod config;
pub mod dataloader;
pub mod datamodule;
pub mod hooks;
pub mod input;
pub mod processor;
pub mod transforms;

pub use callback::{BaseDataFetcher, CallbackSet, FetcherGuard, PipelineCallback};
pub use collate::{default_collate, default_uncollate, DefaultCollate};
pub use config::{
    ConfigFormat, ConfigLoader, ConfigManager, ConfigValidation, DataModuleConfig, EnvironmentOverride,
    StageTransforms,
};
pub use dataloader::{
    DataLoader, DataLoaderBuilder, DataLoaderConfig, DataLoaderIterator, RandomSampler, Sampler,
    SequentialSampler,
};
pub use datamodule::{split_train_val, DataModule, DataModuleBuilder, ProcessorPair};
pub use hooks::{HookBase, HookName, HookPlacement, HookSlot, HookTable, KeyPrefix, ResolvedHook};
pub use input::{
    default_load_data, DatasetInput, Input, InputBase, InputData, InputHook, InputHooks, InputKind,
    InputSnapshot, InputSource, IterableInput, RawData, SampleStream, StreamSource,
};
pub use processor::{create_processors, make_collates, CollateSlot, InputTransformProcessor};
pub use transforms::{
    create_transform, factory, shared, ApplyToKeys, Compose, Identity, InputTransform, InputTransformState,
    PipelineState, SharedTransform, Transform, TransformConfig, TransformFactory, TransformHooks,
    TransformProvenance, TransformRegistry, WithMetadata,
};
