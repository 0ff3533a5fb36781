//! DataLoader Module
//!
//! Batched iteration over inputs with the worker-side transform processor
//! applied to every batch.
//!
//! ```rust,ignore
//! use kindling_data::dataloader::{DataLoaderBuilder, SequentialSampler};
//!
//! let loader = DataLoaderBuilder::new(input)
//!     .batch_size(32)
//!     .num_workers(4)
//!     .drop_last(true)
//!     .build(SequentialSampler::new())?;
//!
//! for batch in loader.iter() {
//!     let batch = batch?;
//! }
//! ```

pub mod builder;
pub mod core;
pub mod samplers;

pub use self::builder::DataLoaderBuilder;
pub use self::core::{DataLoader, DataLoaderConfig, DataLoaderIterator};
pub use self::samplers::{RandomSampler, Sampler, SequentialSampler};
