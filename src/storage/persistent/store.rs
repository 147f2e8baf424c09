//! Durable [`KeyValueStore`] backed by a WAL and a compacted snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::storage::traits::{KeyValueStore, StorageError};

use super::file_lock::StoreLock;
use super::snapshot::{self, Snapshot};
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

/// File name of the write-ahead log.
pub const WAL_FILE_NAME: &str = "geoproof.wal";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionResult {
    /// Keys written to the snapshot.
    pub keys: usize,
    /// WAL size before truncation.
    pub wal_size_before: u64,
}

/// WAL-backed key/value store.
///
/// Writes hit the log before the in-memory map; reads are served from the
/// map. The directory is locked for the lifetime of the store.
pub struct PersistentKeyValueStore {
    dir: PathBuf,
    _lock: StoreLock,
    wal: WriteAheadLog,
    values: RwLock<HashMap<String, String>>,
    config: PersistentConfig,
}

impl std::fmt::Debug for PersistentKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentKeyValueStore")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistentKeyValueStore {
    /// Opens or creates a store in `dir`.
    ///
    /// # Errors
    /// - If the directory cannot be created or locked
    /// - If the snapshot is unreadable
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = StoreLock::acquire(dir)?;

        let snapshot = snapshot::load_snapshot(dir)?;
        let (base_sequence, mut values) = match snapshot {
            Some(s) => (s.sequence, s.values.into_iter().collect::<HashMap<_, _>>()),
            None => (0, HashMap::new()),
        };

        let wal = WriteAheadLog::open(&dir.join(WAL_FILE_NAME), config.sync_on_write, base_sequence)?;

        let mut replayed = 0usize;
        let mut damaged = false;
        for entry in wal.iter()? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "dropping damaged WAL tail");
                    damaged = true;
                    break;
                }
            };
            if entry.sequence <= base_sequence {
                continue;
            }
            match entry.kind {
                WalEntryKind::Set { key, value } => {
                    values.insert(key, value);
                }
                WalEntryKind::Delete { key } => {
                    values.remove(&key);
                }
            }
            replayed += 1;
        }

        if replayed > 0 {
            debug!(replayed, "replayed WAL entries");
        }

        let store = Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            values: RwLock::new(values),
            config,
        };

        // New frames appended after a damaged one would be unreachable on the
        // next replay.
        if damaged {
            store.compact()?;
            info!(dir = %store.dir.display(), "store compacted after WAL recovery");
        }

        Ok(store)
    }

    /// Directory holding the store files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshots the current map and truncates the WAL.
    ///
    /// If this fails partway, the WAL still holds every mutation and is
    /// replayed on the next open.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        // Holding the write lock keeps the snapshot and the WAL in step.
        let values = self.values.write().map_err(|_| lock_err("persistent.compact"))?;
        self.compact_locked(&values)
    }

    fn compact_locked(&self, values: &HashMap<String, String>) -> Result<CompactionResult, StorageError> {
        let wal_size_before = self.wal.size_bytes()?;
        let snapshot = Snapshot {
            sequence: self.wal.current_sequence()?,
            written_at: Utc::now(),
            values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<BTreeMap<_, _>>(),
        };
        snapshot::write_snapshot(&self.dir, &snapshot)?;
        self.wal.truncate()?;

        Ok(CompactionResult {
            keys: snapshot.values.len(),
            wal_size_before,
        })
    }

    fn maybe_compact(&self, values: &HashMap<String, String>) {
        match self.wal.size_bytes() {
            Ok(size) if size > self.config.max_wal_size => {
                if let Err(e) = self.compact_locked(values) {
                    warn!(error = %e, "WAL compaction failed; log keeps growing");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not stat WAL"),
        }
    }

    fn apply(&self, kind: WalEntryKind) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(|_| lock_err("persistent.apply"))?;
        self.wal.append(kind.clone())?;
        match kind {
            WalEntryKind::Set { key, value } => {
                values.insert(key, value);
            }
            WalEntryKind::Delete { key } => {
                values.remove(&key);
            }
        }
        self.maybe_compact(&values);
        Ok(())
    }
}

impl KeyValueStore for PersistentKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.read().map_err(|_| lock_err("persistent.get"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.apply(WalEntryKind::Set {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        {
            let values = self.values.read().map_err(|_| lock_err("persistent.delete"))?;
            if !values.contains_key(key) {
                return Ok(());
            }
        }
        self.apply(WalEntryKind::Delete { key: key.to_string() })
    }
}
