//! Configurable limits
//!
//! Limits are validated at the API boundary and carried by the database
//! instance; nothing here is a process-global.

/// Resource limits enforced at the public API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum key / collection-name length in bytes
    pub max_key_bytes: usize,
    /// Maximum persistence-adapter blob size in bytes
    pub max_blob_bytes: usize,
    /// Maximum number of fields in one compound index
    pub max_index_fields: usize,
    /// Default batch size for bulk insert
    pub default_batch_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_key_bytes: 1024,
            max_blob_bytes: 100 * 1024 * 1024,
            max_index_fields: 16,
            default_batch_size: 1000,
        }
    }
}

impl Limits {
    /// Small limits for exercising boundary behaviour in tests
    pub fn for_testing() -> Self {
        Self {
            max_key_bytes: 64,
            max_blob_bytes: 1024 * 1024,
            max_index_fields: 4,
            default_batch_size: 10,
        }
    }
}
