//! # kindling-core
//!
//! Shared building blocks for kindling data pipelines: the running stage
//! selector, the dynamically shaped sample [`Value`], an ndarray-backed
//! [`Tensor`], the crate-wide [`KindlingError`], and a named [`Registry`].

#![warn(unsafe_code)]
#![allow(clippy::result_large_err)]

pub mod error;
pub mod registry;
pub mod stage;
pub mod tensor;
pub mod value;

pub use error::{KindlingError, Result};
pub use registry::Registry;
pub use stage::RunningStage;
pub use tensor::{DType, Tensor};
pub use value::{DataKeys, Sample, Value};
