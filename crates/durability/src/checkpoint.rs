//! Checkpoints
//!
//! A checkpoint is a full snapshot of in-memory state plus the WAL
//! position at which that snapshot is consistent. Snapshots serialise
//! as one JSON document; the manager retains the newest N (default 10)
//! and drops the rest.

use monarch_core::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Default number of checkpoints retained
pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

/// Identity and consistency point of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Checkpoint id
    pub id: String,
    /// Milliseconds since epoch at snapshot time
    pub timestamp: i64,
    /// WAL position the snapshot is consistent at; replay starts after
    /// this position
    pub wal_position: u64,
}

/// One collection's persisted state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// All records
    pub records: Vec<Document>,
    /// Index definitions, opaque to this layer
    pub index_defs: Vec<serde_json::Value>,
}

/// A full snapshot of database state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identity and WAL consistency point
    pub metadata: SnapshotMetadata,
    /// Collections by name
    pub collections: BTreeMap<String, CollectionSnapshot>,
    /// Container key space, opaque to this layer
    pub containers: serde_json::Value,
}

impl Snapshot {
    /// Build an empty snapshot at `wal_position`
    pub fn new(wal_position: u64) -> Self {
        Self {
            metadata: SnapshotMetadata {
                id: Uuid::new_v4().to_string(),
                timestamp: monarch_core::now_millis(),
                wal_position,
            },
            collections: BTreeMap::new(),
            containers: serde_json::Value::Null,
        }
    }
}

/// Writes, lists, loads, and retires checkpoint files
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    /// Open a manager over `dir`, creating it
    pub fn new(dir: impl Into<PathBuf>, max_checkpoints: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_checkpoints: max_checkpoints.max(1),
        })
    }

    /// The checkpoint directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(snapshot: &Snapshot) -> String {
        // Millis first so lexicographic order equals chronological order
        format!(
            "{:013}_{}.snapshot.json",
            snapshot.metadata.timestamp, snapshot.metadata.id
        )
    }

    /// Write a checkpoint, optionally fsyncing, then retire old ones
    pub fn write(&self, snapshot: &Snapshot, fsync: bool) -> Result<PathBuf> {
        let path = self.dir.join(Self::file_name(snapshot));
        let blob = serde_json::to_vec(snapshot)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &blob)?;
        if fsync {
            let file = fs::File::open(&tmp)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        let taken_at = chrono::DateTime::from_timestamp_millis(snapshot.metadata.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        info!(
            checkpoint = snapshot.metadata.id.as_str(),
            wal_position = snapshot.metadata.wal_position,
            taken_at = taken_at.as_str(),
            "checkpoint written"
        );
        self.cleanup()?;
        Ok(path)
    }

    /// Checkpoint files, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.ends_with(".snapshot.json"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Drop everything but the newest `max_checkpoints`; returns how
    /// many were removed
    pub fn cleanup(&self) -> Result<usize> {
        let files = self.list()?;
        if files.len() <= self.max_checkpoints {
            return Ok(0);
        }
        let excess = files.len() - self.max_checkpoints;
        for path in &files[..excess] {
            fs::remove_file(path)?;
        }
        Ok(excess)
    }

    fn load_file(path: &Path) -> Result<Snapshot> {
        let blob = fs::read(path)?;
        serde_json::from_slice(&blob)
            .map_err(|e| Error::Integrity(format!("snapshot parse failure: {e}")))
    }

    /// Load the newest readable checkpoint
    ///
    /// A checkpoint that fails to parse is reported and the next-newest
    /// is tried; corruption costs durability back to the previous
    /// checkpoint, never a startup failure.
    pub fn load_latest(&self) -> Result<Option<Snapshot>> {
        self.load_latest_at_or_before(i64::MAX)
    }

    /// Load the newest readable checkpoint taken at or before `t`
    pub fn load_latest_at_or_before(&self, t: i64) -> Result<Option<Snapshot>> {
        for path in self.list()?.iter().rev() {
            match Self::load_file(path) {
                Ok(snapshot) if snapshot.metadata.timestamp <= t => return Ok(Some(snapshot)),
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable checkpoint, trying older");
                }
            }
        }
        Ok(None)
    }
}
