//! Persistence adapters
//!
//! The single-blob alternative to WAL mode: the engine serialises its
//! whole state and hands the bytes to an adapter. The file adapter
//! validates paths (no `..`, no NUL), refuses blobs over the configured
//! cap (100 MiB by default), treats a missing file as empty state, and
//! saves through a temp-file rename.

use monarch_core::{Error, Limits, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Opaque-blob persistence
pub trait PersistenceAdapter: Send + Sync {
    /// Persist the blob, replacing any previous one
    fn save(&self, blob: &[u8]) -> Result<()>;

    /// Load the last saved blob; empty when nothing was ever saved
    fn load(&self) -> Result<Vec<u8>>;
}

/// File-backed adapter
#[derive(Debug)]
pub struct FileAdapter {
    path: PathBuf,
    limits: Limits,
}

impl FileAdapter {
    /// Create an adapter writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_limits(path, Limits::default())
    }

    /// Create an adapter with custom limits
    pub fn with_limits(path: impl Into<PathBuf>, limits: Limits) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self { path, limits })
    }

    /// The backing path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn validate_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("path cannot be empty".into()));
    }
    if path.to_string_lossy().contains('\x00') {
        return Err(Error::InvalidArgument("path cannot contain NUL bytes".into()));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::InvalidArgument(
            "path cannot contain parent-directory components".into(),
        ));
    }
    Ok(())
}

impl PersistenceAdapter for FileAdapter {
    fn save(&self, blob: &[u8]) -> Result<()> {
        if blob.len() > self.limits.max_blob_bytes {
            return Err(Error::ResourceLimit(format!(
                "blob of {} bytes exceeds the {} byte cap",
                blob.len(),
                self.limits.max_blob_bytes
            )));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("saving");
        fs::write(&tmp, blob)?;
        let file = fs::File::open(&tmp)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(blob) if blob.len() > self.limits.max_blob_bytes => Err(Error::ResourceLimit(
                format!(
                    "stored blob of {} bytes exceeds the {} byte cap",
                    blob.len(),
                    self.limits.max_blob_bytes
                ),
            )),
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-memory adapter for tests and ephemeral databases
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    blob: Mutex<Vec<u8>>,
}

impl MemoryAdapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn save(&self, blob: &[u8]) -> Result<()> {
        *self.blob.lock() = blob.to_vec();
        Ok(())
    }

    fn load(&self) -> Result<Vec<u8>> {
        Ok(self.blob.lock().clone())
    }
}
