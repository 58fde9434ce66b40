//! Core types for the Monarch database
//!
//! This crate defines the value model (`Value`, `Document`), record id
//! allocation, dotted field-path resolution, the unified error type, and
//! instance-level configuration. Everything else in the workspace builds
//! on these types.

pub mod config;
pub mod error;
pub mod id;
pub mod key;
pub mod limits;
pub mod path;
pub mod value;

pub use config::{EnvConfig, Environment, LogFormat, LogLevel};
pub use error::{Error, ErrorKind, Result};
pub use id::IdAllocator;
pub use key::{validate_key, validate_key_with_limits};
pub use limits::Limits;
pub use path::{get_path, remove_path, set_path};
pub use value::{cmp_values, now_millis, values_equal, Document, Value, ID_FIELD};
