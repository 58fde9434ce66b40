//! Container primitives for Monarch
//!
//! The structured-cache surface: lists, sets, hashes, skip-list sorted
//! sets, streams, geospatial sets, time series, vector stores, and
//! property graphs, all behind a flat kind-checked key space
//! (`ContainerStore`).

pub mod geo;
pub mod graph;
pub mod hash;
pub mod list;
pub mod set;
pub mod store;
pub mod stream;
pub mod timeseries;
pub mod vector;
pub mod zset;

pub use geo::{haversine_km, GeoRadiusHit, GeoRadiusOptions, GeoSet, EARTH_RADIUS_KM};
pub use graph::{
    Direction, Graph, GraphEdge, GraphNode, TraverseOptions, TraverseResult,
};
pub use hash::HashValue;
pub use list::ListValue;
pub use set::SetValue;
pub use store::{Container, ContainerKind, ContainerStore};
pub use stream::{parse_bound, Stream, StreamId};
pub use timeseries::{Sample, TimeSeries};
pub use vector::{cosine_similarity, VectorEntry, VectorMatch, VectorSet};
pub use zset::SortedSet;
