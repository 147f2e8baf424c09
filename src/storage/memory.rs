//! In-memory storage backend.
//!
//! Thread-safe and non-durable. Intended for tests, simulations, and hosts
//! that supply durability elsewhere. Clones share the same map, which lets a
//! test drop a monitor and build a fresh one over the same state to mimic a
//! cold start.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::storage::traits::{KeyValueStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyValueStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.values.read().map_err(|_| lock_err("memory.len"))?.len())
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.read().map_err(|_| lock_err("memory.get"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| lock_err("memory.set"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| lock_err("memory.delete"))?;
        values.remove(key);
        Ok(())
    }
}
