//! Durable key/value backend.
//!
//! This module provides crash-safe storage with:
//! - Write-Ahead Logging (WAL) for crash recovery
//! - File locking so only one process writes a store directory
//! - CRC32 checksums for corruption detection
//! - Snapshot compaction to bound the log
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── .geoproof.lock   exclusive flock / LockFileEx
//! ├── geoproof.snap    compacted map + covered WAL sequence
//! └── geoproof.wal     Set/Delete frames since the snapshot
//! ```

mod codec;
mod file_lock;
mod snapshot;
mod store;
mod wal;

pub use file_lock::StoreLock;
pub use snapshot::Snapshot;
pub use store::{CompactionResult, PersistentKeyValueStore, WAL_FILE_NAME};
pub use wal::{WalEntry, WalEntryKind, WriteAheadLog};

use std::path::Path;

use crate::error::ValidationError;
use crate::storage::StorageError;

/// Configuration for the durable store.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// WAL size (bytes) beyond which a write triggers compaction.
    pub max_wal_size: u64,
    /// Whether to fsync after every write.
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 1024 * 1024, // 1 MiB
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    /// Smallest accepted `max_wal_size`; avoids compacting on every write.
    pub const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Rejects degenerate settings.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if `max_wal_size` is too small.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}

/// Opens or creates a durable store at `path`.
///
/// # Errors
/// - If the configuration is invalid
/// - If the path cannot be created or another process holds the lock
/// - If the snapshot is unreadable
///
/// # Example
/// ```rust,ignore
/// use geoproof::storage::{open_store, KeyValueStore};
///
/// let store = open_store("./attendance.geoproof", None)?;
/// store.set("k", "v")?;
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentKeyValueStore, StorageError> {
    let cfg = config
        .unwrap_or_default()
        .validate()
        .map_err(|e| StorageError::BackendError(e.to_string()))?;
    PersistentKeyValueStore::open(path.as_ref(), cfg)
}
