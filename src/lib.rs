//! MonarchDB: an embedded multi-model database
//!
//! One library, five semantic surfaces over a shared substrate:
//!
//! - **Documents**: schemaless collections with secondary indexes
//!   (unique, sparse, compound, TTL, text), Mongo-style queries, and an
//!   aggregation pipeline
//! - **Containers**: lists, sets, hashes, skip-list sorted sets,
//!   streams, geospatial sets, and time series under a flat key space
//! - **Vectors**: top-k cosine similarity search
//! - **Graphs**: labelled property graphs with BFS traversal, shortest
//!   paths, and centrality
//! - **Full-text**: tokenised indexes with TF-IDF ranking
//!
//! Durability is write-ahead logging plus checkpoints with crash
//! recovery; every mutation is observable through the change stream.
//!
//! # Example
//!
//! ```
//! use monarchdb::{Database, Document};
//!
//! let db = Database::in_memory();
//! db.insert(
//!     "users",
//!     Document::from_json_str(r#"{"name": "ada", "role": "engineer"}"#).unwrap(),
//! )
//! .unwrap();
//! let query = Document::from_json_str(r#"{"role": "engineer"}"#).unwrap();
//! assert_eq!(db.count("users", &query), 1);
//! ```

pub use monarch_core::{
    Document, EnvConfig, Error, ErrorKind, Limits, LogFormat, LogLevel, Result, Value,
};
pub use monarch_durability::{DurabilityLevel, FileAdapter, MemoryAdapter, PersistenceAdapter};
pub use monarch_engine::{Database, DatabaseConfig, DatabaseStats, HealthReport, CONTAINER_EVENTS};
pub use monarch_primitives::{Direction, GeoRadiusOptions, StreamId, TraverseOptions};
pub use monarch_storage::{
    ChangeEvent, ChangeType, FindOptions, IndexOptions, Subscription, SubscriptionFilter,
};

/// Lower-level query surface: matcher, planner, aggregation
pub use monarch_query as query;
/// Lower-level text surface: tokenizer, posting lists, TF-IDF
pub use monarch_search as search;

/// Install a global `tracing` subscriber honouring the environment's
/// log level and format
///
/// Optional: the library itself never installs a subscriber. Calling
/// this twice (or alongside another subscriber) is a no-op.
pub fn init_logging(env: &EnvConfig) {
    use tracing_subscriber::filter::LevelFilter;
    let level = match env.log_level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Fatal => LevelFilter::ERROR,
    };
    let builder = tracing_subscriber::fmt().with_max_level(level);
    let installed = match env.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    // Err means a subscriber is already installed; leave it alone.
    drop(installed);
}
