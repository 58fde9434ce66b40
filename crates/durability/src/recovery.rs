//! Crash recovery
//!
//! On start: load the newest readable checkpoint, then replay WAL
//! entries with positions beyond it, in ascending timestamp order.
//! Archived entries are considered first when an archive exists.
//! Point-in-time recovery caps both the checkpoint and the replayed
//! entries at the requested timestamp.

use crate::checkpoint::{CheckpointManager, Snapshot};
use crate::wal::{read_entries, WalEntry};
use monarch_core::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// What recovery found
#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    /// The snapshot to restore from, if any checkpoint was readable
    pub snapshot: Option<Snapshot>,
    /// WAL entries to replay on top, ordered
    pub entries: Vec<WalEntry>,
    /// Corrupt WAL lines that were skipped
    pub skipped: usize,
}

fn collect_entries(wal_path: &Path, archive_path: Option<&Path>) -> Result<(Vec<WalEntry>, usize)> {
    let mut entries = Vec::new();
    let mut skipped = 0;
    if let Some(archive) = archive_path {
        let read = read_entries(archive)?;
        entries.extend(read.entries);
        skipped += read.skipped;
    }
    let read = read_entries(wal_path)?;
    entries.extend(read.entries);
    skipped += read.skipped;
    Ok((entries, skipped))
}

/// Plan a full recovery from the latest checkpoint plus the log tail
pub fn recover(
    wal_path: &Path,
    checkpoints: &CheckpointManager,
    archive_path: Option<&Path>,
) -> Result<RecoveryOutcome> {
    recover_to(i64::MAX, wal_path, checkpoints, archive_path)
}

/// Plan a point-in-time recovery to wall-clock `t` (millis)
pub fn recover_to(
    t: i64,
    wal_path: &Path,
    checkpoints: &CheckpointManager,
    archive_path: Option<&Path>,
) -> Result<RecoveryOutcome> {
    let snapshot = checkpoints.load_latest_at_or_before(t)?;
    let base_position = snapshot
        .as_ref()
        .map(|s| s.metadata.wal_position)
        .unwrap_or(0);

    let (mut entries, skipped) = collect_entries(wal_path, archive_path)?;
    entries.retain(|e| e.id > base_position && e.timestamp <= t);
    // Replay order is ascending timestamp; the position breaks ties so
    // entries within one millisecond keep their append order.
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    info!(
        checkpoint = snapshot.as_ref().map(|s| s.metadata.id.as_str()).unwrap_or("<none>"),
        replay = entries.len(),
        skipped,
        "recovery plan ready"
    );
    Ok(RecoveryOutcome {
        snapshot,
        entries,
        skipped,
    })
}

/// Move WAL entries older than `cutoff` (millis) into the archive
///
/// The archive is append-only; the live log is rewritten without the
/// moved entries via a temp-file rename. Returns how many entries
/// moved.
pub fn archive_older_than(wal_path: &Path, archive_path: &Path, cutoff: i64) -> Result<usize> {
    let read = read_entries(wal_path)?;
    let (old, keep): (Vec<WalEntry>, Vec<WalEntry>) = read
        .entries
        .into_iter()
        .partition(|e| e.timestamp < cutoff);
    if old.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut archive = OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive_path)?;
    for entry in &old {
        writeln!(archive, "{}", serde_json::to_string(entry)?)?;
    }
    archive.sync_all()?;

    let tmp = wal_path.with_extension("rewrite");
    {
        let mut rewritten = std::fs::File::create(&tmp)?;
        for entry in &keep {
            writeln!(rewritten, "{}", serde_json::to_string(entry)?)?;
        }
        rewritten.sync_all()?;
    }
    std::fs::rename(&tmp, wal_path)?;

    info!(moved = old.len(), kept = keep.len(), "WAL entries archived");
    Ok(old.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Snapshot;
    use crate::wal::{DurabilityLevel, WalWriter};
    use monarch_core::Value;
    use tempfile::tempdir;

    fn write_entries(path: &Path, n: u64) {
        let mut writer = WalWriter::open(path, DurabilityLevel::High).unwrap();
        for i in 0..n {
            writer
                .append(
                    "insert",
                    Some("c".into()),
                    serde_json::from_str(&format!(r#"{{"n": {i}}}"#)).unwrap(),
                )
                .unwrap();
        }
        writer.flush().unwrap();
    }

    #[test]
    fn test_recover_without_checkpoint_replays_everything() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        write_entries(&wal, 5);
        let checkpoints = CheckpointManager::new(dir.path().join("cp"), 10).unwrap();
        let outcome = recover(&wal, &checkpoints, None).unwrap();
        assert!(outcome.snapshot.is_none());
        assert_eq!(outcome.entries.len(), 5);
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_recover_starts_after_checkpoint_position() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        write_entries(&wal, 10);
        let checkpoints = CheckpointManager::new(dir.path().join("cp"), 10).unwrap();
        // Checkpoint consistent through position 6
        checkpoints.write(&Snapshot::new(6), false).unwrap();
        let outcome = recover(&wal, &checkpoints, None).unwrap();
        assert_eq!(outcome.snapshot.unwrap().metadata.wal_position, 6);
        assert_eq!(outcome.entries.len(), 4);
        assert!(outcome.entries.iter().all(|e| e.id > 6));
    }

    #[test]
    fn test_entries_replay_in_timestamp_order() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        write_entries(&wal, 20);
        let checkpoints = CheckpointManager::new(dir.path().join("cp"), 10).unwrap();
        let outcome = recover(&wal, &checkpoints, None).unwrap();
        assert!(outcome
            .entries
            .windows(2)
            .all(|w| (w[0].timestamp, w[0].id) <= (w[1].timestamp, w[1].id)));
    }

    #[test]
    fn test_point_in_time_caps_entries() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        write_entries(&wal, 5);
        let read = crate::wal::read_entries(&wal).unwrap();
        let cut = read.entries[2].timestamp;
        let checkpoints = CheckpointManager::new(dir.path().join("cp"), 10).unwrap();
        let outcome = recover_to(cut, &wal, &checkpoints, None).unwrap();
        assert!(outcome.entries.iter().all(|e| e.timestamp <= cut));
        assert!(outcome.entries.len() >= 3);
    }

    #[test]
    fn test_archival_and_recovery_with_archive() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        let archive = dir.path().join("archive.log");
        write_entries(&wal, 6);
        // Everything written so far is "old"
        let moved = archive_older_than(&wal, &archive, i64::MAX).unwrap();
        assert_eq!(moved, 6);
        assert!(crate::wal::read_entries(&wal).unwrap().entries.is_empty());

        // New traffic lands in the live log
        {
            let mut writer = WalWriter::open(&wal, DurabilityLevel::High).unwrap();
            writer.append("insert", Some("c".into()), Value::Null).unwrap();
            writer.flush().unwrap();
        }

        let checkpoints = CheckpointManager::new(dir.path().join("cp"), 10).unwrap();
        let outcome = recover(&wal, &checkpoints, Some(&archive)).unwrap();
        // Archived entries still participate in recovery
        assert_eq!(outcome.entries.len(), 7);
    }

    #[test]
    fn test_archive_nothing_to_move() {
        let dir = tempdir().unwrap();
        let wal = dir.path().join("wal.log");
        write_entries(&wal, 3);
        let moved =
            archive_older_than(&wal, &dir.path().join("archive.log"), 0).unwrap();
        assert_eq!(moved, 0);
        assert_eq!(crate::wal::read_entries(&wal).unwrap().entries.len(), 3);
    }
}
