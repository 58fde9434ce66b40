//! List container
//!
//! A deque of values with O(1) head/tail operations and Redis-style
//! negative indexing: `-1` is the last element, `-2` the one before it.

use monarch_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Resolve a possibly-negative index against `len`
///
/// Out-of-range negatives clamp to 0 for range starts; `None` means the
/// index falls outside the list entirely.
fn resolve(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    }
}

/// An ordered sequence of values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListValue {
    items: VecDeque<Value>,
}

impl ListValue {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Push values onto the head, leftmost argument ends up outermost
    pub fn lpush(&mut self, values: Vec<Value>) -> usize {
        for value in values {
            self.items.push_front(value);
        }
        self.items.len()
    }

    /// Push values onto the tail
    pub fn rpush(&mut self, values: Vec<Value>) -> usize {
        for value in values {
            self.items.push_back(value);
        }
        self.items.len()
    }

    /// Pop from the head
    pub fn lpop(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    /// Pop from the tail
    pub fn rpop(&mut self) -> Option<Value> {
        self.items.pop_back()
    }

    /// Element at `index`, negative counts from the tail
    pub fn lindex(&self, index: i64) -> Option<&Value> {
        resolve(index, self.items.len()).and_then(|i| self.items.get(i))
    }

    /// Replace the element at `index`; false when out of range
    pub fn lset(&mut self, index: i64, value: Value) -> bool {
        match resolve(index, self.items.len()) {
            Some(i) => {
                self.items[i] = value;
                true
            }
            None => false,
        }
    }

    /// Number of elements
    pub fn llen(&self) -> usize {
        self.items.len()
    }

    /// True when the list holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements from `start` to `end` inclusive, Redis semantics
    ///
    /// Indices clamp to the list bounds; an inverted range yields
    /// nothing.
    pub fn lrange(&self, start: i64, end: i64) -> Vec<Value> {
        let len = self.items.len();
        if len == 0 {
            return Vec::new();
        }
        let start = normalize_clamped(start, len);
        let end = normalize_clamped(end, len);
        if start > end {
            return Vec::new();
        }
        self.items
            .iter()
            .skip(start)
            .take(end - start + 1)
            .cloned()
            .collect()
    }

    /// Keep only `start..=end`; the caller deletes the key when this
    /// leaves the list empty (`start > end` empties it, as in Redis)
    pub fn ltrim(&mut self, start: i64, end: i64) {
        let len = self.items.len();
        if len == 0 {
            return;
        }
        let start_n = normalize_clamped(start, len);
        let end_n = normalize_clamped(end, len);
        if start_n > end_n || (start >= 0 && start as usize >= len) {
            self.items.clear();
            return;
        }
        self.items.truncate(end_n + 1);
        self.items.drain(..start_n);
    }
}

/// Clamp a possibly-negative index into `0..len`
fn normalize_clamped(index: i64, len: usize) -> usize {
    if index >= 0 {
        (index as usize).min(len - 1)
    } else {
        let back = index.unsigned_abs() as usize;
        len.saturating_sub(back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(n: i64) -> ListValue {
        let mut list = ListValue::new();
        list.rpush((0..n).map(Value::Int).collect());
        list
    }

    #[test]
    fn test_push_pop_ends() {
        let mut list = ListValue::new();
        list.rpush(vec![Value::Int(2)]);
        list.lpush(vec![Value::Int(1)]);
        list.rpush(vec![Value::Int(3)]);
        assert_eq!(list.llen(), 3);
        assert_eq!(list.lpop(), Some(Value::Int(1)));
        assert_eq!(list.rpop(), Some(Value::Int(3)));
        assert_eq!(list.lpop(), Some(Value::Int(2)));
        assert_eq!(list.lpop(), None);
    }

    #[test]
    fn test_lpush_order() {
        let mut list = ListValue::new();
        list.lpush(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        // Pushed one at a time: 3 ends up at the head
        assert_eq!(list.lrange(0, -1), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_lindex_negative() {
        let list = list_of(5);
        assert_eq!(list.lindex(0), Some(&Value::Int(0)));
        assert_eq!(list.lindex(-1), Some(&Value::Int(4)));
        assert_eq!(list.lindex(-5), Some(&Value::Int(0)));
        assert_eq!(list.lindex(5), None);
        assert_eq!(list.lindex(-6), None);
    }

    #[test]
    fn test_lrange_negative_window() {
        let list = list_of(5);
        // The boundary case from the interface contract
        assert_eq!(list.lrange(-2, -1), vec![Value::Int(3), Value::Int(4)]);
        assert_eq!(list.lrange(0, -1).len(), 5);
        assert_eq!(list.lrange(1, 2), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_lrange_clamps() {
        let list = list_of(3);
        assert_eq!(list.lrange(0, 99).len(), 3);
        assert_eq!(list.lrange(-99, 99).len(), 3);
        assert!(list.lrange(2, 1).is_empty());
    }

    #[test]
    fn test_lset() {
        let mut list = list_of(3);
        assert!(list.lset(-1, Value::Int(99)));
        assert_eq!(list.lindex(2), Some(&Value::Int(99)));
        assert!(!list.lset(7, Value::Int(0)));
    }

    #[test]
    fn test_ltrim_window() {
        let mut list = list_of(5);
        list.ltrim(1, 3);
        assert_eq!(list.lrange(0, -1), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_ltrim_inverted_range_empties() {
        let mut list = list_of(5);
        list.ltrim(4, 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_ltrim_negative() {
        let mut list = list_of(5);
        list.ltrim(-2, -1);
        assert_eq!(list.lrange(0, -1), vec![Value::Int(3), Value::Int(4)]);
    }
}
