//! Compacted snapshots of the key/value map.
//!
//! A snapshot is written to a temporary file, fsynced, and renamed over the
//! previous one, so a crash leaves either the old or the new snapshot intact.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec;

/// File name of the current snapshot.
pub const SNAPSHOT_FILE_NAME: &str = "geoproof.snap";

/// Full key/value state as of a WAL sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every WAL entry up to and including this sequence is reflected.
    pub sequence: u64,
    /// When the snapshot was taken.
    pub written_at: DateTime<Utc>,
    /// The key/value map.
    pub values: BTreeMap<String, String>,
}

fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE_NAME)
}

/// Atomically replaces the snapshot in `dir`.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> IoResult<()> {
    let final_path = snapshot_path(dir);
    let temp_path = dir.join(format!("{SNAPSHOT_FILE_NAME}.{}.tmp", Uuid::new_v4()));

    let result = (|| {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;
        writer.write_all(&codec::encode(snapshot)?)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, &final_path)
    })();

    if result.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Loads the snapshot in `dir`, if one exists.
///
/// Stale temporary files left by an interrupted write are removed.
pub fn load_snapshot(dir: &Path) -> IoResult<Option<Snapshot>> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "tmp") {
            let _ = fs::remove_file(&path);
        }
    }

    let path = snapshot_path(dir);
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(&path)?);
    codec::read_header(&mut reader)?;
    codec::decode::<Snapshot>(&mut reader)?
        .ok_or_else(|| IoError::new(ErrorKind::UnexpectedEof, "snapshot file has no body"))
        .map(Some)
}
