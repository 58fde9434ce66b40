//! Durability for Monarch
//!
//! Write-ahead logging with checksummed newline-delimited JSON entries,
//! checkpoint snapshots with bounded retention, crash and point-in-time
//! recovery, WAL archival, single-blob persistence adapters, and the
//! data-directory lock.

pub mod adapter;
pub mod checkpoint;
pub mod lock;
pub mod recovery;
pub mod wal;

pub use adapter::{FileAdapter, MemoryAdapter, PersistenceAdapter};
pub use checkpoint::{
    CheckpointManager, CollectionSnapshot, Snapshot, SnapshotMetadata, DEFAULT_MAX_CHECKPOINTS,
};
pub use lock::{DirLock, LOCK_FILE};
pub use recovery::{archive_older_than, recover, recover_to, RecoveryOutcome};
pub use wal::{read_entries, DurabilityLevel, WalEntry, WalRead, WalWriter};
