/// Named Registries
///
/// A small ordered name → entry map used to look up transform factories (and
/// anything else) by a string key. Lookups of a missing name fail with a
/// lookup error that lists the names that are available.
use indexmap::IndexMap;

use crate::error::{KindlingError, Result};

/// Ordered registry of named entries
#[derive(Debug, Clone)]
pub struct Registry<T> {
    name: String,
    entries: IndexMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: IndexMap::new(),
        }
    }

    /// Registry name, reported in lookup errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `entry` under `key`; registering a taken key is a configuration error
    pub fn register(&mut self, key: impl Into<String>, entry: T) -> Result<()> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(KindlingError::configuration_with(
                format!("'{}' is already registered in '{}'", key, self.name),
                [key],
            ));
        }
        log::debug!("registry '{}': registered '{}'", self.name, key);
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Builder form of [`Registry::register`]
    pub fn with(mut self, key: impl Into<String>, entry: T) -> Result<Self> {
        self.register(key, entry)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Result<&T> {
        self.entries
            .get(key)
            .ok_or_else(|| KindlingError::lookup(&self.name, key, self.names()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = Registry::new("numbers")
            .with("one", 1)
            .unwrap()
            .with("two", 2)
            .unwrap();
        assert_eq!(*registry.get("two").unwrap(), 2);
        assert_eq!(registry.names(), vec!["one", "two"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = Registry::new("numbers");
        registry.register("one", 1).unwrap();
        let err = registry.register("one", 11).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.mentions("one"));
    }

    #[test]
    fn test_missing_key_is_lookup_error() {
        let registry: Registry<i32> = Registry::new("empty");
        let err = registry.get("resize").unwrap_err();
        assert!(err.is_lookup());
        assert!(err.to_string().contains("resize"));
    }
}
