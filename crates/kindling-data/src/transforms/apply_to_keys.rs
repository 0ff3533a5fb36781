//! Key-scoped application of a transform
//!
//! [`ApplyToKeys`] runs a transform on selected entries of a sample mapping
//! and leaves every other entry untouched. With one key present the transform
//! receives that entry's value; with several it receives a list and must
//! return a list of the same length.

use super::{SharedTransform, Transform};
use kindling_core::{KindlingError, Result, Value};

pub struct ApplyToKeys {
    keys: Vec<String>,
    transform: SharedTransform,
}

impl ApplyToKeys {
    pub fn new(key: impl Into<String>, transform: SharedTransform) -> Self {
        Self {
            keys: vec![key.into()],
            transform,
        }
    }

    pub fn with_keys<I, S>(keys: I, transform: SharedTransform) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            transform,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Transform for ApplyToKeys {
    fn apply(&self, value: Value) -> Result<Value> {
        let mut sample = match value {
            Value::Map(sample) => sample,
            other => {
                return Err(KindlingError::invalid_argument_op(
                    "apply_to_keys",
                    format!("expected a sample mapping, got {}", other.kind()),
                ))
            }
        };

        let present: Vec<&String> = self
            .keys
            .iter()
            .filter(|key| sample.contains_key(key.as_str()))
            .collect();

        match present.as_slice() {
            [] => {}
            [key] => {
                let input = sample.get(key.as_str()).cloned().unwrap_or_default();
                let output = self.transform.apply(input)?;
                sample.insert((*key).clone(), output);
            }
            keys => {
                let inputs: Vec<Value> = keys
                    .iter()
                    .map(|key| sample.get(key.as_str()).cloned().unwrap_or_default())
                    .collect();
                let outputs = match self.transform.apply(Value::List(inputs))? {
                    Value::List(outputs) if outputs.len() == keys.len() => outputs,
                    other => {
                        return Err(KindlingError::invalid_argument_op(
                            "apply_to_keys",
                            format!(
                                "transform over {} keys must return a list of {} values, got {}",
                                keys.len(),
                                keys.len(),
                                other.kind()
                            ),
                        ))
                    }
                };
                for (key, output) in keys.iter().zip(outputs) {
                    sample.insert((*key).clone(), output);
                }
            }
        }
        Ok(Value::Map(sample))
    }

    fn describe(&self) -> String {
        format!("ApplyToKeys({:?}, {})", self.keys, self.transform.describe())
    }
}
