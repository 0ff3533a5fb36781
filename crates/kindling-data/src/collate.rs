//! Default Collation
//!
//! Structural batching of samples into one batch value, and the inverse
//! operation that splits a batch back into per-sample values.

use crate::transforms::Transform;
use kindling_core::{KindlingError, Result, Sample, Tensor, Value};

/// Merge a list of samples into a single batch.
///
/// Same-shaped tensors are stacked along a new leading axis, numbers become a
/// 1-D tensor (`int64` when every sample is an integer, `float32` otherwise),
/// strings, booleans and nulls are kept as a list, mappings are
/// collated key by key and equal-length lists position by position.
pub fn default_collate(samples: Vec<Value>) -> Result<Value> {
    let first = samples.first().ok_or_else(|| {
        KindlingError::invalid_argument_op("default_collate", "Cannot collate empty batch")
    })?;

    match first {
        Value::Tensor(_) => {
            let tensors = samples
                .iter()
                .map(|s| match s {
                    Value::Tensor(t) => Ok(t.clone()),
                    other => Err(mixed_kinds("tensor", other)),
                })
                .collect::<Result<Vec<Tensor>>>()?;
            Ok(Value::Tensor(Tensor::stack(&tensors)?))
        }
        Value::Int(_) | Value::Float(_) => {
            if let Some(other) = samples.iter().find(|s| !matches!(s, Value::Int(_) | Value::Float(_))) {
                return Err(mixed_kinds("number", other));
            }
            let ints = samples
                .iter()
                .map(|s| match s {
                    Value::Int(v) => Some(*v),
                    _ => None,
                })
                .collect::<Option<Vec<i64>>>();
            match ints {
                Some(ints) => Ok(Value::Tensor(Tensor::from(ints))),
                None => {
                    let floats: Vec<f32> = samples.iter().filter_map(Value::as_f64).map(|v| v as f32).collect();
                    Ok(Value::Tensor(Tensor::from(floats)))
                }
            }
        }
        Value::Str(_) | Value::Bool(_) | Value::Null => Ok(Value::List(samples)),
        Value::Map(template) => {
            let keys: Vec<String> = template.keys().cloned().collect();
            let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(samples.len()); keys.len()];
            for sample in samples {
                let mut map = match sample {
                    Value::Map(map) => map,
                    other => return Err(mixed_kinds("map", &other)),
                };
                for (column, key) in columns.iter_mut().zip(&keys) {
                    let value = map.shift_remove(key).ok_or_else(|| {
                        KindlingError::invalid_argument_op(
                            "default_collate",
                            format!("sample is missing key '{}'", key),
                        )
                    })?;
                    column.push(value);
                }
                if let Some(extra) = map.keys().next() {
                    return Err(KindlingError::invalid_argument_op(
                        "default_collate",
                        format!("sample has key '{}' that the first sample lacks", extra),
                    ));
                }
            }
            let mut batch = Sample::with_capacity(keys.len());
            for (key, column) in keys.into_iter().zip(columns) {
                batch.insert(key, default_collate(column)?);
            }
            Ok(Value::Map(batch))
        }
        Value::List(template) => {
            let width = template.len();
            let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(samples.len()); width];
            for sample in samples {
                let items = match sample {
                    Value::List(items) if items.len() == width => items,
                    Value::List(items) => {
                        return Err(KindlingError::invalid_argument_op(
                            "default_collate",
                            format!(
                                "each element in list of batch should be of equal size, got {} and {}",
                                width,
                                items.len()
                            ),
                        ))
                    }
                    other => return Err(mixed_kinds("list", &other)),
                };
                for (column, item) in columns.iter_mut().zip(items) {
                    column.push(item);
                }
            }
            columns
                .into_iter()
                .map(default_collate)
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
    }
}

/// Split a batch back into per-sample values.
///
/// A mapping yields one mapping per sample, a tensor yields its rows (rows of
/// a 1-D tensor come back as `Int` or `Float` values), and a
/// list of list-like columns is transposed. A list of scalars or mappings is
/// already per-sample and is returned as is.
pub fn default_uncollate(batch: Value) -> Result<Vec<Value>> {
    match batch {
        Value::Map(map) => {
            let mut keys = Vec::with_capacity(map.len());
            let mut columns = Vec::with_capacity(map.len());
            for (key, value) in map {
                keys.push(key);
                columns.push(default_uncollate(value)?);
            }
            let len = columns.first().map_or(0, Vec::len);
            if let Some((key, column)) = keys.iter().zip(&columns).find(|(_, c)| c.len() != len) {
                return Err(KindlingError::invalid_argument_op(
                    "default_uncollate",
                    format!(
                        "all batch entries must have the same length, '{}' has {} instead of {}",
                        key,
                        column.len(),
                        len
                    ),
                ));
            }
            let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
            Ok((0..len)
                .map(|_| {
                    Value::Map(
                        keys.iter()
                            .cloned()
                            .zip(columns.iter_mut().map(|c| c.next().unwrap_or_default()))
                            .collect(),
                    )
                })
                .collect())
        }
        Value::Tensor(tensor) => Ok(tensor
            .unstack()?
            .into_iter()
            .map(|row| row.item().unwrap_or(Value::Tensor(row)))
            .collect()),
        Value::List(items) if items.iter().all(is_list_like) && !items.is_empty() => {
            let columns = items
                .into_iter()
                .map(default_uncollate)
                .collect::<Result<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
            Ok((0..len)
                .map(|_| {
                    Value::List(
                        columns
                            .iter_mut()
                            .map(|c| c.next().unwrap_or_default())
                            .collect(),
                    )
                })
                .collect())
        }
        Value::List(items) => Ok(items),
        other => Err(KindlingError::invalid_argument_op(
            "default_uncollate",
            format!(
                "The batch of outputs to be uncollated is expected to be a map or list-like, got {}",
                other.kind()
            ),
        )),
    }
}

fn is_list_like(value: &Value) -> bool {
    match value {
        Value::List(_) => true,
        Value::Tensor(t) => t.rank() > 0,
        _ => false,
    }
}

fn mixed_kinds(expected: &str, found: &Value) -> KindlingError {
    KindlingError::invalid_argument_op(
        "default_collate",
        format!("cannot collate a {} with a {}", expected, found.kind()),
    )
}

/// [`default_collate`] as a [`Transform`] over a list of samples
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCollate;

impl Transform for DefaultCollate {
    fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::List(samples) => default_collate(samples),
            other => default_collate(vec![other]),
        }
    }

    fn describe(&self) -> String {
        "DefaultCollate".to_string()
    }
}
