//! The Monarch engine
//!
//! `Database` is the top-level facade: document collections with
//! secondary indexes and ad-hoc queries, Redis-style containers, vector
//! search, property graphs, full-text search, change streams, and
//! WAL-plus-checkpoint durability, all behind one handle.

pub mod config;
pub mod database;

pub use config::DatabaseConfig;
pub use database::{Database, DatabaseStats, HealthReport, CONTAINER_EVENTS};
