//! Error types for Monarch
//!
//! One unified `Error` enum for the whole engine, built with `thiserror`.
//! Every variant maps onto a stable `ErrorKind` so callers can branch on
//! the category without matching concrete variants, and public messages
//! never carry internal stack traces.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Monarch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error categories exposed to callers
///
/// These are the propagation classes: `Validation` and `NotFound` go back
/// to the caller; `Integrity` during recovery skips the offending entry;
/// `Io` propagates unless the durability level permits best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: bad path, empty key, oversize key, mixed container kinds
    Validation,
    /// Missing collection, record, edge, index
    NotFound,
    /// Duplicate id, unique-index violation, locked data dir
    Conflict,
    /// Key too long, payload too large, too many arguments
    ResourceLimit,
    /// WAL write failure, snapshot read failure, permission denied
    Io,
    /// Checksum mismatch, snapshot parse failure, orphan index entry
    Integrity,
    /// Operation exceeded its deadline
    Timeout,
}

impl ErrorKind {
    /// Stable wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ResourceLimit => "resource-limit",
            ErrorKind::Io => "io",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// Error type for the Monarch database
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed input on a specific field
    #[error("invalid field '{field}': {message}")]
    InvalidField {
        /// The offending field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// Named entity does not exist
    #[error("{entity} not found: {name}")]
    NotFound {
        /// Entity class ("collection", "record", "index", "edge", ...)
        entity: &'static str,
        /// The missing name or id
        name: String,
    },

    /// Caller supplied an id that already exists
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Unique index already holds this key
    #[error("unique index violation on '{index}' for key {key}")]
    UniqueViolation {
        /// Index name
        index: String,
        /// Composite key that collided
        key: String,
    },

    /// Container key already holds a different kind
    #[error("wrong kind for key '{key}': holds {found}, operation needs {expected}")]
    WrongContainerKind {
        /// Container key
        key: String,
        /// Kind the operation needs
        expected: &'static str,
        /// Kind actually stored
        found: &'static str,
    },

    /// Data directory is held by another instance
    #[error("data directory is locked by another process: {0}")]
    Locked(String),

    /// A configured limit was exceeded
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Checksum mismatch, corrupt snapshot, orphan index entry
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Operation exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// The stable category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::InvalidField { .. } => ErrorKind::Validation,
            Error::WrongContainerKind { .. } => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::DuplicateId(_) | Error::UniqueViolation { .. } | Error::Locked(_) => {
                ErrorKind::Conflict
            }
            Error::ResourceLimit(_) => ErrorKind::ResourceLimit,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) | Error::Integrity(_) => ErrorKind::Integrity,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// The offending field, when the error is about one
    pub fn field_hint(&self) -> Option<&str> {
        match self {
            Error::InvalidField { field, .. } => Some(field),
            Error::UniqueViolation { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Shorthand for a missing collection
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            entity: "collection",
            name: name.into(),
        }
    }

    /// Shorthand for a missing index
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            entity: "index",
            name: name.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
