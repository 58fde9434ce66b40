//! Hash container
//!
//! A per-key mapping from field name to value.

use monarch_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field → value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashValue {
    fields: BTreeMap<String, Value>,
}

impl HashValue {
    /// Create an empty hash
    pub fn new() -> Self {
        Self::default()
    }

    /// Set fields; returns how many were new
    pub fn hset(&mut self, pairs: Vec<(String, Value)>) -> usize {
        let mut added = 0;
        for (field, value) in pairs {
            if self.fields.insert(field, value).is_none() {
                added += 1;
            }
        }
        added
    }

    /// Fetch a field
    pub fn hget(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Delete fields; returns how many existed
    pub fn hdel(&mut self, fields: &[String]) -> usize {
        fields
            .iter()
            .filter(|f| self.fields.remove(f.as_str()).is_some())
            .count()
    }

    /// All fields and values
    pub fn hgetall(&self) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Field names
    pub fn hkeys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Field values
    pub fn hvals(&self) -> Vec<Value> {
        self.fields.values().cloned().collect()
    }

    /// Number of fields
    pub fn hlen(&self) -> usize {
        self.fields.len()
    }

    /// True when the hash holds nothing
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field existence
    pub fn hexists(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Add `delta` to an integer field, creating it at 0
    pub fn hincrby(&mut self, field: &str, delta: i64) -> Result<i64> {
        let current = match self.fields.get(field) {
            None => 0,
            Some(Value::Int(i)) => *i,
            Some(other) => {
                return Err(Error::InvalidField {
                    field: field.to_string(),
                    message: format!("hincrby target holds {}, not an integer", other.type_name()),
                })
            }
        };
        let next = current.wrapping_add(delta);
        self.fields.insert(field.to_string(), Value::Int(next));
        Ok(next)
    }
}
