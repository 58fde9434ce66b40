//! Key and name validation
//!
//! Collection names and container keys are Unicode strings with the same
//! constraints:
//! - must not be empty
//! - must not contain NUL bytes (\0)
//! - must not exceed `max_key_bytes` (default: 1024)
//!
//! Validation failures surface as `Error::InvalidArgument` /
//! `Error::ResourceLimit` through the `validate_key` helper.

use crate::error::{Error, Result};
use crate::limits::Limits;

/// Validate a key or collection name using default limits
pub fn validate_key(key: &str) -> Result<()> {
    validate_key_with_limits(key, &Limits::default())
}

/// Validate a key or collection name with custom limits
pub fn validate_key_with_limits(key: &str, limits: &Limits) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key cannot be empty".to_string()));
    }
    if key.contains('\x00') {
        return Err(Error::InvalidArgument(
            "key cannot contain NUL bytes".to_string(),
        ));
    }
    if key.len() > limits.max_key_bytes {
        return Err(Error::ResourceLimit(format!(
            "key length {} exceeds maximum {}",
            key.len(),
            limits.max_key_bytes
        )));
    }
    Ok(())
}
