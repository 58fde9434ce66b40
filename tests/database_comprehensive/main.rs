//! End-to-end tests across the whole database surface
//!
//! Each module exercises one surface through the public facade:
//! documents and aggregation, containers, vectors and graphs, the
//! change stream, and durability/recovery.

mod changes_events;
mod containers;
mod documents;
mod recovery;
mod vectors_graphs;

use monarchdb::Document;

/// Parse a JSON document, panicking on bad test input
pub fn doc(json: &str) -> Document {
    Document::from_json_str(json).expect("test document must parse")
}
