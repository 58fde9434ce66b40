//! Data-directory lock
//!
//! One database instance owns its data directory exclusively. The lock
//! is an OS-level advisory lock on a `LOCK` file, so a second opener in
//! any process is refused, and a crashed owner releases the lock when
//! its file handle dies.

use fs2::FileExt;
use monarch_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the data directory
pub const LOCK_FILE: &str = "LOCK";

/// Held exclusive lock on a data directory
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Acquire the lock, creating the directory as needed
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::Locked(dir.display().to_string()))?;
        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
