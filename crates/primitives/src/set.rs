//! Set container
//!
//! An unordered collection of distinct values. `Value` carries floats,
//! so members are keyed by their canonical JSON encoding rather than a
//! `Hash` impl; `Int(1)` and `Float(1.0)` are distinct members, the same
//! distinction the record model draws.

use monarch_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn member_key(value: &Value) -> String {
    serde_json::to_string(value).expect("values are always JSON-representable")
}

/// A set of distinct values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetValue {
    members: BTreeMap<String, Value>,
}

impl SetValue {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add members; returns how many were new
    pub fn sadd(&mut self, values: Vec<Value>) -> usize {
        let mut added = 0;
        for value in values {
            if self.members.insert(member_key(&value), value).is_none() {
                added += 1;
            }
        }
        added
    }

    /// Remove members; returns how many were present
    pub fn srem(&mut self, values: &[Value]) -> usize {
        values
            .iter()
            .filter(|v| self.members.remove(&member_key(v)).is_some())
            .count()
    }

    /// All members, in canonical-key order
    pub fn smembers(&self) -> Vec<Value> {
        self.members.values().cloned().collect()
    }

    /// Membership test
    pub fn sismember(&self, value: &Value) -> bool {
        self.members.contains_key(&member_key(value))
    }

    /// Number of members
    pub fn scard(&self) -> usize {
        self.members.len()
    }

    /// True when the set holds nothing
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members present in both sets
    pub fn sinter(&self, other: &SetValue) -> Vec<Value> {
        self.members
            .iter()
            .filter(|(k, _)| other.members.contains_key(*k))
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Members present in either set
    pub fn sunion(&self, other: &SetValue) -> Vec<Value> {
        let mut merged = self.members.clone();
        for (k, v) in &other.members {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
        merged.into_values().collect()
    }

    /// Members of `self` absent from `other`
    pub fn sdiff(&self, other: &SetValue) -> Vec<Value> {
        self.members
            .iter()
            .filter(|(k, _)| !other.members.contains_key(*k))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(values: &[i64]) -> SetValue {
        let mut set = SetValue::new();
        set.sadd(values.iter().map(|v| Value::Int(*v)).collect());
        set
    }

    #[test]
    fn test_add_dedupes() {
        let mut set = SetValue::new();
        assert_eq!(set.sadd(vec![Value::Int(1), Value::Int(2), Value::Int(1)]), 2);
        assert_eq!(set.scard(), 2);
        assert_eq!(set.sadd(vec![Value::Int(2)]), 0);
    }

    #[test]
    fn test_membership_and_removal() {
        let mut set = set_of(&[1, 2, 3]);
        assert!(set.sismember(&Value::Int(2)));
        assert!(!set.sismember(&Value::Int(9)));
        assert_eq!(set.srem(&[Value::Int(2), Value::Int(9)]), 1);
        assert!(!set.sismember(&Value::Int(2)));
    }

    #[test]
    fn test_int_and_float_are_distinct_members() {
        let mut set = SetValue::new();
        set.sadd(vec![Value::Int(1), Value::Float(1.0)]);
        assert_eq!(set.scard(), 2);
    }

    #[test]
    fn test_set_algebra() {
        let a = set_of(&[1, 2, 3]);
        let b = set_of(&[2, 3, 4]);
        assert_eq!(a.sinter(&b), vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(a.sunion(&b).len(), 4);
        assert_eq!(a.sdiff(&b), vec![Value::Int(1)]);
        assert_eq!(b.sdiff(&a), vec![Value::Int(4)]);
    }

    #[test]
    fn test_mixed_kind_members() {
        let mut set = SetValue::new();
        set.sadd(vec![
            Value::Str("x".into()),
            Value::Array(vec![Value::Int(1)]),
            Value::Null,
        ]);
        assert_eq!(set.scard(), 3);
        assert!(set.sismember(&Value::Array(vec![Value::Int(1)])));
    }
}
