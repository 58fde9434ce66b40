//! Journal hook
//!
//! The collection store journals every mutation before applying it. The
//! trait lives here so storage does not depend on the durability crate;
//! the engine wires a WAL-backed implementation in at construction, and
//! tests use an in-memory recorder.

use monarch_core::{Result, Value};

/// One journalled operation, before WAL framing
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Operation name (`insert`, `update`, `remove`, `createCollection`,
    /// `dropCollection`, `createIndex`, `dropIndex`, `containerOp`)
    pub operation: String,
    /// Collection the operation applies to, when scoped to one
    pub collection: Option<String>,
    /// Operation-dependent payload
    pub data: Value,
}

impl JournalEntry {
    /// Build an entry scoped to a collection
    pub fn scoped(operation: &str, collection: &str, data: Value) -> Self {
        Self {
            operation: operation.to_string(),
            collection: Some(collection.to_string()),
            data,
        }
    }
}

/// Sink for journalled operations
///
/// `append` returns the journal position assigned to the entry.
/// Implementations decide durability; the collection only guarantees
/// ordering (journal before apply).
pub trait Journal: Send + Sync {
    /// Append an entry, returning its position
    fn append(&self, entry: JournalEntry) -> Result<u64>;
}

/// Journal that remembers entries in memory, for tests
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: parking_lot::Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, entry: JournalEntry) -> Result<u64> {
        let mut entries = self.entries.lock();
        entries.push(entry);
        Ok(entries.len() as u64)
    }
}
