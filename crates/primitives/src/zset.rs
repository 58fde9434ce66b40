//! Sorted-set container
//!
//! A skip list keyed by `(score, member)` plus a member → score map, so
//! membership tests and score lookups are O(1) while ordered walks and
//! range queries ride the probabilistic O(log n) list.
//!
//! Node heights are drawn from a geometric distribution with p = 0.25,
//! capped at 16 levels. Rank is computed by a bottom-level scan.

use monarch_core::{Error, Result};
use rand::Rng;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_LEVEL: usize = 16;
const LEVEL_P: f64 = 0.25;

struct Node {
    member: String,
    score: f64,
    /// Forward links, one per level this node participates in
    forward: Vec<Option<usize>>,
}

/// Skip list over `(score, member)` pairs
struct SkipList {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    /// Head forward links, one per active level
    head: Vec<Option<usize>>,
    len: usize,
}

/// `(score, member)` ordering: score first, member breaks ties
fn precedes(a_score: f64, a_member: &str, b_score: f64, b_member: &str) -> bool {
    match a_score.partial_cmp(&b_score) {
        Some(std::cmp::Ordering::Less) => true,
        Some(std::cmp::Ordering::Greater) => false,
        _ => a_member < b_member,
    }
}

impl SkipList {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: vec![None],
            len: 0,
        }
    }

    fn node(&self, idx: usize) -> &Node {
        self.slots[idx].as_ref().expect("live node index")
    }

    fn random_level() -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 1;
        while level < MAX_LEVEL && rng.gen::<f64>() < LEVEL_P {
            level += 1;
        }
        level
    }

    /// For each level, the last node strictly preceding `(score, member)`
    /// (`None` meaning the head)
    fn search_path(&self, score: f64, member: &str) -> Vec<Option<usize>> {
        let mut update = vec![None; self.head.len()];
        let mut current: Option<usize> = None;
        for level in (0..self.head.len()).rev() {
            loop {
                let next = match current {
                    None => self.head[level],
                    Some(i) => self.node(i).forward[level],
                };
                match next {
                    Some(j) if precedes(self.node(j).score, &self.node(j).member, score, member) => {
                        current = Some(j);
                    }
                    _ => break,
                }
            }
            update[level] = current;
        }
        update
    }

    fn next_at(&self, from: Option<usize>, level: usize) -> Option<usize> {
        match from {
            None => self.head[level],
            Some(i) => self.node(i).forward[level],
        }
    }

    fn insert(&mut self, score: f64, member: String) {
        let level = Self::random_level();
        while self.head.len() < level {
            self.head.push(None);
        }
        let update = self.search_path(score, &member);

        let mut forward = Vec::with_capacity(level);
        for lvl in 0..level {
            forward.push(self.next_at(update.get(lvl).copied().flatten(), lvl));
        }
        let node = Node {
            member,
            score,
            forward,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        for lvl in 0..level {
            match update.get(lvl).copied().flatten() {
                None => self.head[lvl] = Some(idx),
                Some(prev) => {
                    self.slots[prev]
                        .as_mut()
                        .expect("live node index")
                        .forward[lvl] = Some(idx);
                }
            }
        }
        self.len += 1;
    }

    fn remove(&mut self, score: f64, member: &str) -> bool {
        let update = self.search_path(score, member);
        let target = match self.next_at(update.first().copied().flatten(), 0) {
            Some(idx)
                if self.node(idx).member == member && self.node(idx).score == score =>
            {
                idx
            }
            _ => return false,
        };
        let target_levels = self.node(target).forward.len();
        for lvl in 0..target_levels {
            let next = self.node(target).forward[lvl];
            match update.get(lvl).copied().flatten() {
                None => {
                    if self.head[lvl] == Some(target) {
                        self.head[lvl] = next;
                    }
                }
                Some(prev) => {
                    let prev_node = self.slots[prev].as_mut().expect("live node index");
                    if prev_node.forward[lvl] == Some(target) {
                        prev_node.forward[lvl] = next;
                    }
                }
            }
        }
        self.slots[target] = None;
        self.free.push(target);
        self.len -= 1;
        true
    }

    /// Ascending `(member, score)` walk of the bottom level
    fn iter(&self) -> SkipIter<'_> {
        SkipIter {
            list: self,
            next: self.head[0],
        }
    }
}

struct SkipIter<'a> {
    list: &'a SkipList,
    next: Option<usize>,
}

impl<'a> Iterator for SkipIter<'a> {
    type Item = (&'a str, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = self.list.node(idx);
        self.next = node.forward[0];
        Some((&node.member, node.score))
    }
}

/// A sorted set of members with numeric scores
pub struct SortedSet {
    list: SkipList,
    scores: HashMap<String, f64>,
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedSet {
    /// Create an empty sorted set
    pub fn new() -> Self {
        Self {
            list: SkipList::new(),
            scores: HashMap::new(),
        }
    }

    fn check_score(score: f64) -> Result<f64> {
        if score.is_finite() {
            Ok(score)
        } else {
            Err(Error::InvalidArgument("score must be a finite number".into()))
        }
    }

    /// Add or update members; returns how many were new
    pub fn zadd(&mut self, entries: Vec<(String, f64)>) -> Result<usize> {
        let mut added = 0;
        for (member, score) in entries {
            let score = Self::check_score(score)?;
            match self.scores.insert(member.clone(), score) {
                Some(old) => {
                    self.list.remove(old, &member);
                }
                None => added += 1,
            }
            self.list.insert(score, member);
        }
        Ok(added)
    }

    /// Remove members; returns how many were present
    pub fn zrem(&mut self, members: &[String]) -> usize {
        let mut removed = 0;
        for member in members {
            if let Some(score) = self.scores.remove(member.as_str()) {
                self.list.remove(score, member);
                removed += 1;
            }
        }
        removed
    }

    /// Score of a member
    pub fn zscore(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Add `delta` to a member's score, creating it at `delta`
    pub fn zincrby(&mut self, delta: f64, member: &str) -> Result<f64> {
        let next = self.zscore(member).unwrap_or(0.0) + delta;
        let next = Self::check_score(next)?;
        self.zadd(vec![(member.to_string(), next)])?;
        Ok(next)
    }

    /// Ascending rank of a member, by bottom-level scan
    pub fn zrank(&self, member: &str) -> Option<usize> {
        self.scores.get(member)?;
        self.list.iter().position(|(m, _)| m == member)
    }

    /// Number of members
    pub fn zcard(&self) -> usize {
        self.scores.len()
    }

    /// True when the set holds nothing
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Members between ranks `start` and `end` inclusive, negative ranks
    /// counting from the tail
    pub fn zrange(&self, start: i64, end: i64) -> Vec<(String, f64)> {
        let len = self.zcard();
        if len == 0 {
            return Vec::new();
        }
        let clamp = |i: i64| -> usize {
            if i >= 0 {
                (i as usize).min(len - 1)
            } else {
                len.saturating_sub(i.unsigned_abs() as usize)
            }
        };
        let (start, end) = (clamp(start), clamp(end));
        if start > end {
            return Vec::new();
        }
        self.list
            .iter()
            .skip(start)
            .take(end - start + 1)
            .map(|(m, s)| (m.to_string(), s))
            .collect()
    }

    /// Members with `min <= score <= max`, ascending
    pub fn zrangebyscore(&self, min: f64, max: f64) -> Vec<(String, f64)> {
        self.list
            .iter()
            .skip_while(|(_, s)| *s < min)
            .take_while(|(_, s)| *s <= max)
            .map(|(m, s)| (m.to_string(), s))
            .collect()
    }

    /// Full ascending enumeration
    pub fn entries(&self) -> Vec<(String, f64)> {
        self.list
            .iter()
            .map(|(m, s)| (m.to_string(), s))
            .collect()
    }
}

impl std::fmt::Debug for SortedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedSet")
            .field("len", &self.zcard())
            .finish()
    }
}

impl Clone for SortedSet {
    fn clone(&self) -> Self {
        let mut copy = SortedSet::new();
        copy.zadd(self.entries())
            .expect("stored scores are always finite");
        copy
    }
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

// The skip list serialises as its ascending entry list and is rebuilt on
// load; link structure is never persisted.
impl Serialize for SortedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SortedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = Vec::<(String, f64)>::deserialize(deserializer)?;
        let mut set = SortedSet::new();
        set.zadd(entries).map_err(serde::de::Error::custom)?;
        Ok(set)
    }
}
