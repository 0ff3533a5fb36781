//! Dense Tensors
//!
//! A thin n-dimensional array used as the numeric payload of samples and
//! batches, holding either `f32` or `i64` elements. Only the operations the
//! data pipeline needs are provided: building, stacking along a new leading
//! axis, and splitting back into rows.

use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KindlingError, Result};
use crate::value::Value;

/// Element type of a [`Tensor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Int64,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Int64 => "int64",
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
enum Storage {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

/// Dynamically shaped tensor
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Storage,
}

impl Tensor {
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self {
            data: Storage::Float32(data),
        }
    }

    pub fn from_i64_array(data: ArrayD<i64>) -> Self {
        Self {
            data: Storage::Int64(data),
        }
    }

    /// Build a tensor from flat data in row-major order
    pub fn from_vec(values: Vec<f32>, shape: &[usize]) -> Result<Self> {
        check_len("tensor_from_vec", shape, values.len())?;
        Ok(Self::from_array(ArrayD::from_shape_vec(IxDyn(shape), values)?))
    }

    /// Integer counterpart of [`Tensor::from_vec`]
    pub fn from_i64_vec(values: Vec<i64>, shape: &[usize]) -> Result<Self> {
        check_len("tensor_from_i64_vec", shape, values.len())?;
        Ok(Self::from_i64_array(ArrayD::from_shape_vec(IxDyn(shape), values)?))
    }

    pub fn scalar(value: f32) -> Self {
        Self::from_array(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::ones(IxDyn(shape)))
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            Storage::Float32(_) => DType::Float32,
            Storage::Int64(_) => DType::Int64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            Storage::Float32(a) => a.shape(),
            Storage::Int64(a) => a.shape(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_array(&self) -> Option<&ArrayD<f32>> {
        match &self.data {
            Storage::Float32(a) => Some(a),
            Storage::Int64(_) => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&ArrayD<i64>> {
        match &self.data {
            Storage::Int64(a) => Some(a),
            Storage::Float32(_) => None,
        }
    }

    /// Elements in row-major order, integers converted to `f32`
    pub fn to_vec(&self) -> Vec<f32> {
        match &self.data {
            Storage::Float32(a) => a.iter().copied().collect(),
            Storage::Int64(a) => a.iter().map(|&v| v as f32).collect(),
        }
    }

    /// Elements in row-major order; `None` unless the tensor holds integers
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        self.as_i64_array().map(|a| a.iter().copied().collect())
    }

    /// Apply `f` element-wise; integer tensors are promoted to `f32`
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        match &self.data {
            Storage::Float32(a) => Self::from_array(a.mapv(f)),
            Storage::Int64(a) => Self::from_array(a.mapv(|v| f(v as f32))),
        }
    }

    /// The single element of a rank-0 tensor as an `Int` or `Float` value
    pub fn item(&self) -> Option<Value> {
        if self.rank() != 0 {
            return None;
        }
        match &self.data {
            Storage::Float32(a) => a.iter().next().map(|&v| Value::Float(f64::from(v))),
            Storage::Int64(a) => a.iter().next().map(|&v| Value::Int(v)),
        }
    }

    /// Stack same-shaped tensors of one dtype along a new leading axis
    pub fn stack(tensors: &[Tensor]) -> Result<Tensor> {
        let first = tensors.first().ok_or_else(|| {
            KindlingError::invalid_argument_op("tensor_stack", "Cannot stack an empty list")
        })?;
        if let Some(other) = tensors.iter().find(|t| t.shape() != first.shape()) {
            return Err(KindlingError::invalid_shape_op(
                "tensor_stack",
                format!(
                    "all tensors must share a shape, found {:?} and {:?}",
                    first.shape(),
                    other.shape()
                ),
            ));
        }
        if let Some(other) = tensors.iter().find(|t| t.dtype() != first.dtype()) {
            return Err(KindlingError::invalid_argument_op(
                "tensor_stack",
                format!(
                    "all tensors must share a dtype, found {} and {}",
                    first.dtype().name(),
                    other.dtype().name()
                ),
            ));
        }
        match first.dtype() {
            DType::Float32 => {
                let views: Vec<_> = tensors.iter().filter_map(Tensor::as_array).map(|a| a.view()).collect();
                Ok(Self::from_array(ndarray::stack(Axis(0), &views)?))
            }
            DType::Int64 => {
                let views: Vec<_> = tensors
                    .iter()
                    .filter_map(Tensor::as_i64_array)
                    .map(|a| a.view())
                    .collect();
                Ok(Self::from_i64_array(ndarray::stack(Axis(0), &views)?))
            }
        }
    }

    /// Split along the leading axis; the inverse of [`Tensor::stack`]
    pub fn unstack(&self) -> Result<Vec<Tensor>> {
        if self.rank() == 0 {
            return Err(KindlingError::invalid_shape_op(
                "tensor_unstack",
                "cannot unstack a scalar tensor",
            ));
        }
        Ok(match &self.data {
            Storage::Float32(a) => a.outer_iter().map(|row| Self::from_array(row.to_owned())).collect(),
            Storage::Int64(a) => a
                .outer_iter()
                .map(|row| Self::from_i64_array(row.to_owned()))
                .collect(),
        })
    }
}

fn check_len(operation: &str, shape: &[usize], len: usize) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != len {
        return Err(KindlingError::invalid_shape_op(
            operation,
            format!("shape {:?} needs {} elements, got {}", shape, expected, len),
        ));
    }
    Ok(())
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Tensor");
        s.field("dtype", &self.dtype()).field("shape", &self.shape());
        match &self.data {
            Storage::Float32(a) => s.field("data", &a.iter().collect::<Vec<_>>()),
            Storage::Int64(a) => s.field("data", &a.iter().collect::<Vec<_>>()),
        };
        s.finish()
    }
}

impl From<f32> for Tensor {
    fn from(value: f32) -> Self {
        Tensor::scalar(value)
    }
}

impl From<Vec<f32>> for Tensor {
    fn from(values: Vec<f32>) -> Self {
        Self::from_array(ndarray::Array1::from(values).into_dyn())
    }
}

impl From<Vec<i64>> for Tensor {
    fn from(values: Vec<i64>) -> Self {
        Self::from_i64_array(ndarray::Array1::from(values).into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_and_unstack() {
        let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        let b = Tensor::from_vec(vec![3.0, 4.0], &[2]).unwrap();
        let stacked = Tensor::stack(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(stacked.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);

        let rows = stacked.unstack().unwrap();
        assert_eq!(rows, vec![a, b]);
    }

    #[test]
    fn test_stack_shape_mismatch() {
        let a = Tensor::zeros(&[2]);
        let b = Tensor::zeros(&[3]);
        let result = Tensor::stack(&[a, b]);
        assert!(matches!(result, Err(KindlingError::InvalidShape { .. })));
    }

    #[test]
    fn test_stack_dtype_mismatch() {
        let a = Tensor::zeros(&[2]);
        let b = Tensor::from(vec![1_i64, 2]);
        assert!(matches!(
            Tensor::stack(&[a, b]),
            Err(KindlingError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_integer_tensors_keep_their_values() {
        let big = 16_777_217_i64;
        let a = Tensor::from_i64_vec(vec![big, 1], &[2]).unwrap();
        let b = Tensor::from(vec![3_i64, 4]);
        let stacked = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(stacked.dtype(), DType::Int64);
        assert_eq!(stacked.to_i64_vec(), Some(vec![big, 1, 3, 4]));

        let first = &stacked.unstack().unwrap()[0];
        assert_eq!(first.unstack().unwrap()[0].item(), Some(Value::Int(big)));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
        assert!(Tensor::from_i64_vec(vec![1, 2, 3], &[2, 2]).is_err());
        assert_eq!(Tensor::from_vec(vec![0.0; 6], &[2, 3]).unwrap().rank(), 2);
    }

    #[test]
    fn test_scalar_cannot_unstack() {
        assert!(Tensor::scalar(1.0).unstack().is_err());
        assert_eq!(Tensor::scalar(1.5).item(), Some(Value::Float(1.5)));
    }
}
