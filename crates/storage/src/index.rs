//! Secondary indexes
//!
//! An index maps a composite key (the JSON-encoded list of the indexed
//! field values, with missing fields encoded as `null`) to the set of
//! record ids sharing that key. The keyspace is a `BTreeMap`, so range
//! predicates can walk keys in order instead of failing over to a
//! collection scan.
//!
//! Flags: `unique` rejects a second id per key; `sparse` omits records
//! where every indexed field is missing; `text` delegates to the
//! full-text index; `ttl_seconds` expires entries relative to their
//! first indexed field (a timestamp).

use monarch_core::{Document, Error, Result, Value};
use monarch_search::TextIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Declarative description of an index, as persisted in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its collection
    pub name: String,
    /// Indexed field paths, in order
    pub fields: Vec<String>,
    /// No key may map to more than one id
    #[serde(default)]
    pub unique: bool,
    /// Records with every indexed field missing are omitted
    #[serde(default)]
    pub sparse: bool,
    /// Full-text index over the fields
    #[serde(default)]
    pub text: bool,
    /// Entries expire this many seconds after their timestamp field
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

impl IndexDef {
    /// Conventional name: fields joined with `_`
    pub fn default_name(fields: &[String]) -> String {
        fields.join("_")
    }
}

/// A live secondary index
#[derive(Debug)]
pub struct SecondaryIndex {
    def: IndexDef,
    /// composite key (canonical JSON array) → ids
    keys: BTreeMap<String, BTreeSet<String>>,
    /// expiry millis → ids, for the TTL sweep
    expirations: BTreeMap<i64, HashSet<String>>,
    /// id → expiry millis, to untrack on removal
    id_expiry: HashMap<String, i64>,
    /// backing text index when `def.text`
    text: Option<TextIndex>,
}

impl SecondaryIndex {
    /// Create an empty index from its definition
    pub fn new(def: IndexDef) -> Self {
        let text = def
            .text
            .then(|| TextIndex::new(def.fields.clone()));
        Self {
            def,
            keys: BTreeMap::new(),
            expirations: BTreeMap::new(),
            id_expiry: HashMap::new(),
            text,
        }
    }

    /// The index definition
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Number of distinct composite keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of indexed ids
    pub fn entry_count(&self) -> usize {
        self.keys.values().map(|ids| ids.len()).sum()
    }

    /// The backing text index, when this is a text index
    pub fn text_index(&self) -> Option<&TextIndex> {
        self.text.as_ref()
    }

    /// Extract the per-field values for `doc`; missing becomes `Null`
    fn field_values(&self, doc: &Document) -> Vec<Value> {
        self.def
            .fields
            .iter()
            .map(|f| doc.get_path(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Composite key for `doc`, or `None` when sparseness omits it
    pub fn composite_key(&self, doc: &Document) -> Option<String> {
        let all_missing = self.def.fields.iter().all(|f| doc.get_path(f).is_none());
        if self.def.sparse && all_missing {
            return None;
        }
        Some(encode_key(&self.field_values(doc)))
    }

    /// TTL expiry for `doc`, when this index tracks one
    fn expiry_for(&self, doc: &Document) -> Option<i64> {
        let ttl = self.def.ttl_seconds?;
        let base = match doc.get_path(self.def.fields.first()?)? {
            Value::Timestamp(t) => *t,
            Value::Int(t) => *t,
            _ => return None,
        };
        Some(base + ttl * 1000)
    }

    /// Would inserting `doc` under `id` violate uniqueness?
    pub fn check_insert(&self, id: &str, doc: &Document) -> Result<()> {
        if !self.def.unique || self.def.text {
            return Ok(());
        }
        if let Some(key) = self.composite_key(doc) {
            if let Some(ids) = self.keys.get(&key) {
                if !ids.is_empty() && !ids.contains(id) {
                    return Err(Error::UniqueViolation {
                        index: self.def.name.clone(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Add `doc` under `id`
    ///
    /// Callers are expected to have run `check_insert` first; the check
    /// is repeated here so the index never ends up inconsistent.
    pub fn insert(&mut self, id: &str, doc: &Document) -> Result<()> {
        if let Some(text) = &mut self.text {
            text.index_document(id, doc);
            return Ok(());
        }
        self.check_insert(id, doc)?;
        if let Some(key) = self.composite_key(doc) {
            self.keys.entry(key).or_default().insert(id.to_string());
            if let Some(expiry) = self.expiry_for(doc) {
                self.expirations
                    .entry(expiry)
                    .or_default()
                    .insert(id.to_string());
                self.id_expiry.insert(id.to_string(), expiry);
            }
        }
        Ok(())
    }

    /// Remove `doc`'s entry for `id`, pruning empty keys
    pub fn remove(&mut self, id: &str, doc: &Document) {
        if let Some(text) = &mut self.text {
            text.remove_document(id);
            return;
        }
        if let Some(key) = self.composite_key(doc) {
            if let Some(ids) = self.keys.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.keys.remove(&key);
                }
            }
        }
        if let Some(expiry) = self.id_expiry.remove(id) {
            if let Some(ids) = self.expirations.get_mut(&expiry) {
                ids.remove(id);
                if ids.is_empty() {
                    self.expirations.remove(&expiry);
                }
            }
        }
    }

    /// Re-key `id` from `old` to `new`
    pub fn update(&mut self, id: &str, old: &Document, new: &Document) -> Result<()> {
        self.remove(id, old);
        self.insert(id, new)
    }

    /// Ids whose composite key equals `values` exactly
    pub fn ids_for_values(&self, values: &[Value]) -> Vec<String> {
        self.keys
            .get(&encode_key(values))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Walk the ordered keyspace, collecting ids whose decoded key
    /// satisfies `pred`
    pub fn scan<F: Fn(&[Value]) -> bool>(&self, pred: F) -> Vec<String> {
        let mut out = Vec::new();
        for (key, ids) in &self.keys {
            let Ok(values) = serde_json::from_str::<Vec<Value>>(key) else {
                continue;
            };
            if pred(&values) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Keys that violate uniqueness (more than one id)
    pub fn keys_with_multiple_ids(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Ids whose entries expired at or before `now` (millis)
    pub fn expired_ids(&self, now: i64) -> Vec<String> {
        self.expirations
            .range(..=now)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// True when the index holds an entry for `id` keyed by `doc`
    pub fn covers(&self, id: &str, doc: &Document) -> bool {
        if self.text.is_some() {
            return self
                .text
                .as_ref()
                .map_or(false, |t| t.contains(id));
        }
        match self.composite_key(doc) {
            Some(key) => self.keys.get(&key).map_or(false, |ids| ids.contains(id)),
            None => true, // legitimately omitted by sparseness
        }
    }
}

/// Canonical JSON encoding of a composite key
pub fn encode_key(values: &[Value]) -> String {
    serde_json::to_string(values).expect("values are always JSON-representable")
}
