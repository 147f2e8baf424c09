//! Write-ahead log of key/value mutations.
//!
//! Every `set`/`delete` is appended (and fsynced when configured) before the
//! in-memory map changes. On open the log is replayed on top of the latest
//! snapshot.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec frame of WalEntry]
//! [ENTRY 2: codec frame of WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::codec;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The mutation.
    pub kind: WalEntryKind,
}

/// The mutation recorded by a WAL entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalEntryKind {
    Set { key: String, value: String },
    Delete { key: String },
}

struct WalWriter {
    writer: BufWriter<File>,
    sequence: u64,
}

impl WalWriter {
    /// Drops any buffered bytes and cuts the file back to `len`.
    fn roll_back(&mut self, path: &Path, len: u64) -> IoResult<()> {
        let file = OpenOptions::new().append(true).open(path)?;
        file.set_len(len)?;
        let failed = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer without flushing it.
        let _ = failed.into_parts();
        Ok(())
    }
}

fn write_frame(writer: &mut BufWriter<File>, frame: &[u8], sync: bool) -> IoResult<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

/// Append-only mutation log. Thread-safe via an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    inner: Mutex<WalWriter>,
    sync_on_write: bool,
}

fn poisoned() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "poisoned lock: wal")
}

impl WriteAheadLog {
    /// Opens or creates a WAL file.
    ///
    /// Sequence numbers continue from `base_sequence` (the sequence covered by
    /// the latest snapshot) or from the last intact entry, whichever is larger.
    pub fn open(path: &Path, sync_on_write: bool, base_sequence: u64) -> IoResult<Self> {
        let has_header = path.exists() && std::fs::metadata(path)?.len() >= codec::HEADER_LEN;

        let last_sequence = if has_header {
            let mut last = 0;
            for entry in WalIterator::new(path)? {
                match entry {
                    Ok(entry) => last = entry.sequence,
                    Err(_) => break,
                }
            }
            last
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                sequence: last_sequence.max(base_sequence),
            }),
            sync_on_write,
        })
    }

    /// Appends a mutation, returning its sequence number.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;

        let sequence = inner.sequence + 1;
        let encoded = codec::encode(&WalEntry {
            sequence,
            timestamp: Utc::now(),
            kind,
        })?;

        let committed_len = inner.writer.get_ref().metadata()?.len();
        if let Err(e) = write_frame(&mut inner.writer, &encoded, self.sync_on_write) {
            // A frame reported as failed must not reappear on replay.
            if let Err(rollback) = inner.roll_back(&self.path, committed_len) {
                warn!(path = %self.path.display(), error = %rollback, "could not discard failed WAL append");
            }
            return Err(e);
        }

        inner.sequence = sequence;
        Ok(sequence)
    }

    /// Iterates over the entries currently on disk.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.inner.lock().map_err(|_| poisoned())?.sequence)
    }

    /// WAL file size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Drops every entry, keeping the sequence counter.
    ///
    /// Only call this after a snapshot covering `current_sequence()` is durable.
    pub fn truncate(&self) -> IoResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.writer.flush()?;

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        codec::write_header(&mut file)?;
        file.sync_all()?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&self.path)?;
        inner.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Iterator over WAL entries.
///
/// Yields an error for the first damaged or truncated frame and stops there.
pub struct WalIterator {
    reader: BufReader<File>,
    done: bool,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        codec::read_header(&mut reader)?;
        Ok(Self {
            reader,
            done: false,
        })
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match codec::decode::<WalEntry>(&mut self.reader) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
