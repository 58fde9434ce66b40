//! Write-ahead log
//!
//! One JSON object per line: `{id, timestamp, operation, collection?,
//! data, checksum}`. The checksum is a 64-bit xxh3 over the canonical
//! JSON of the first five fields, hex-encoded, so replay can detect a
//! torn or corrupted line and skip it.
//!
//! The writer buffers lines and flushes according to the durability
//! level: `Low` once a second, `Medium` every 100 ms, `High` on every
//! append, `Maximum` on every append with an `fsync`.

use monarch_core::{now_millis, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

/// How hard the writer tries before acknowledging a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityLevel {
    /// Buffered, flushed once a second
    Low,
    /// Buffered, flushed every 100 ms
    #[default]
    Medium,
    /// Flushed to the OS on every append
    High,
    /// Flushed and fsynced on every append
    Maximum,
}

impl DurabilityLevel {
    /// Flush interval for the buffered levels
    fn sync_interval(&self) -> Option<Duration> {
        match self {
            DurabilityLevel::Low => Some(Duration::from_secs(1)),
            DurabilityLevel::Medium => Some(Duration::from_millis(100)),
            DurabilityLevel::High | DurabilityLevel::Maximum => None,
        }
    }

    /// Whether every append must reach the disk platter
    fn fsync_per_op(&self) -> bool {
        matches!(self, DurabilityLevel::Maximum)
    }

    /// True when an I/O failure may be absorbed instead of propagated
    pub fn best_effort(&self) -> bool {
        matches!(self, DurabilityLevel::Low)
    }
}

/// One journalled operation as it appears on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotone position in the log
    pub id: u64,
    /// Milliseconds since epoch at append time
    pub timestamp: i64,
    /// Operation name
    pub operation: String,
    /// Collection the operation is scoped to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Operation-dependent payload
    pub data: Value,
    /// xxh3-64 over the five fields above, lower-hex
    pub checksum: String,
}

impl WalEntry {
    /// Build an entry, computing its checksum
    pub fn new(
        id: u64,
        timestamp: i64,
        operation: impl Into<String>,
        collection: Option<String>,
        data: Value,
    ) -> Self {
        let operation = operation.into();
        let checksum = Self::checksum_of(id, timestamp, &operation, collection.as_deref(), &data);
        Self {
            id,
            timestamp,
            operation,
            collection,
            data,
            checksum,
        }
    }

    fn checksum_of(
        id: u64,
        timestamp: i64,
        operation: &str,
        collection: Option<&str>,
        data: &Value,
    ) -> String {
        let canonical = serde_json::to_string(&(id, timestamp, operation, collection, data))
            .expect("WAL payload is always JSON-representable");
        format!("{:016x}", xxh3_64(canonical.as_bytes()))
    }

    /// True when the stored checksum matches the fields
    pub fn verify(&self) -> bool {
        self.checksum
            == Self::checksum_of(
                self.id,
                self.timestamp,
                &self.operation,
                self.collection.as_deref(),
                &self.data,
            )
    }
}

/// Append-only WAL writer
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    level: DurabilityLevel,
    next_id: u64,
    last_sync: Instant,
    dirty: bool,
}

impl WalWriter {
    /// Open (or create) the log at `path`, resuming after its last entry
    pub fn open(path: impl Into<PathBuf>, level: DurabilityLevel) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let next_id = match read_entries(&path) {
            Ok(read) => read.entries.last().map(|e| e.id + 1).unwrap_or(1),
            Err(_) => 1,
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            level,
            next_id,
            last_sync: Instant::now(),
            dirty: false,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the next append will receive
    pub fn position(&self) -> u64 {
        self.next_id
    }

    /// Append an operation, returning its position
    pub fn append(
        &mut self,
        operation: &str,
        collection: Option<String>,
        data: Value,
    ) -> Result<u64> {
        let entry = WalEntry::new(self.next_id, now_millis(), operation, collection, data);
        let line = serde_json::to_string(&entry)?;
        let write = (|| -> std::io::Result<()> {
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\n")?;
            Ok(())
        })();
        if let Err(e) = write {
            if self.level.best_effort() {
                warn!(error = %e, "WAL append failed, continuing at best-effort level");
                return Ok(self.next_id);
            }
            return Err(Error::Io(e));
        }
        self.next_id += 1;
        self.dirty = true;
        self.maybe_sync()?;
        Ok(entry.id)
    }

    fn maybe_sync(&mut self) -> Result<()> {
        match self.level.sync_interval() {
            None => self.flush_inner(self.level.fsync_per_op()),
            Some(interval) => {
                if self.last_sync.elapsed() >= interval {
                    self.flush_inner(false)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn flush_inner(&mut self, fsync: bool) -> Result<()> {
        if !self.dirty && !fsync {
            return Ok(());
        }
        let result = (|| -> std::io::Result<()> {
            self.writer.flush()?;
            if fsync {
                self.writer.get_ref().sync_all()?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.dirty = false;
                self.last_sync = Instant::now();
                Ok(())
            }
            Err(e) if self.level.best_effort() => {
                warn!(error = %e, "WAL flush failed, continuing at best-effort level");
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Flush buffered lines and fsync
    pub fn flush(&mut self) -> Result<()> {
        self.flush_inner(true)
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        let _ = self.flush_inner(false);
    }
}

/// Result of reading a log
#[derive(Debug, Default)]
pub struct WalRead {
    /// Entries that parsed and verified, in file order
    pub entries: Vec<WalEntry>,
    /// Lines skipped over parse failures or checksum mismatches
    pub skipped: usize,
}

/// Read every valid entry from the log at `path`
///
/// Lines that fail to parse or whose checksum does not verify are
/// counted, reported via `tracing::warn!`, and skipped; a missing file
/// reads as empty.
pub fn read_entries(path: &Path) -> Result<WalRead> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalRead::default()),
        Err(e) => return Err(Error::Io(e)),
    };
    let mut read = WalRead::default();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) if entry.verify() => read.entries.push(entry),
            Ok(entry) => {
                warn!(
                    line = line_no + 1,
                    id = entry.id,
                    "WAL entry failed checksum validation, skipping"
                );
                read.skipped += 1;
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "unparseable WAL line, skipping");
                read.skipped += 1;
            }
        }
    }
    Ok(read)
}
