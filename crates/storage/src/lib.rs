//! Document storage for Monarch
//!
//! The authoritative collection store: records keyed by `_id`, secondary
//! indexes (hash, compound, sparse, unique, TTL, text), a journal hook
//! so every mutation hits the WAL before it is applied, and the
//! change-stream bus mutations publish into.

pub mod changes;
pub mod collection;
pub mod index;
pub mod journal;

pub use changes::{
    ChangeBus, ChangeEvent, ChangeType, Subscription, SubscriptionFilter, DEFAULT_QUEUE_CAPACITY,
};
pub use collection::{BulkInsertReport, Collection, FindOptions, IndexOptions};
pub use index::{encode_key, IndexDef, SecondaryIndex};
pub use journal::{Journal, JournalEntry, MemoryJournal};
