//! Abstract storage contract for geoproof.
//!
//! Backends only have to offer durable string get/set/delete. Callers in the
//! engine go through the `*_best_effort` helpers: a failed read is treated as
//! an absent value and a failed write is logged and swallowed, because a
//! background handler that crashes on degraded storage loses more than one
//! that skips a write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable string key/value storage that survives process restarts.
///
/// # Safety Considerations
/// - Implementations must make `set`/`delete` durable before returning `Ok`
/// - Deleting a missing key is not an error
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes (overwrites) a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a value. Idempotent.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Reads a value, mapping failures to `None`.
    fn get_best_effort(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "storage read failed; treating value as absent");
                None
            }
        }
    }

    /// Writes a value, logging failures. Returns whether the write landed.
    fn set_best_effort(&self, key: &str, value: &str) -> bool {
        match self.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "storage write failed");
                false
            }
        }
    }

    /// Removes a value, logging failures. Returns whether the delete landed.
    fn delete_best_effort(&self, key: &str) -> bool {
        match self.delete(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "storage delete failed");
                false
            }
        }
    }
}

/// Reads and decodes a JSON value; unreadable or undecodable values are absent.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get_best_effort(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "stored value is not valid JSON; treating as absent");
            None
        }
    }
}

/// Encodes and writes a JSON value, best-effort.
pub fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(raw) => store.set_best_effort(key, &raw),
        Err(e) => {
            warn!(key, error = %e, "failed to encode value for storage");
            false
        }
    }
}
