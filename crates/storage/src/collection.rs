//! Collection store
//!
//! The authoritative record map plus its secondary indexes and change
//! publisher. Every mutation follows the same discipline: validate,
//! journal, apply to the record map, update derived indexes, publish a
//! change event. Reads consult the planner for index selection and apply
//! the full query as a residual filter, so a bad plan can cost time but
//! never correctness.

use crate::changes::{ChangeBus, ChangeEvent, ChangeType};
use crate::index::{IndexDef, SecondaryIndex};
use crate::journal::{Journal, JournalEntry};
use monarch_core::{
    validate_key_with_limits, Document, Error, IdAllocator, Limits, Result, Value, ID_FIELD,
};
use monarch_query::{matches, plan, project_document, IndexInfo, StepKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Options for `find`
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Projection specification (include/exclude/computed)
    pub projection: Option<Document>,
    /// Sort specification: object or array of single-key objects
    pub sort: Option<Value>,
    /// Maximum number of records to return
    pub limit: Option<usize>,
    /// Records to skip from the front of the result
    pub skip: usize,
}

/// Options for `create_index`
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Index name; defaults to the fields joined with `_`
    pub name: Option<String>,
    /// Reject duplicate keys
    pub unique: bool,
    /// Omit records with every indexed field missing
    pub sparse: bool,
    /// Full-text index
    pub text: bool,
    /// Expire entries this many seconds after their timestamp field
    pub ttl_seconds: Option<i64>,
}

/// Outcome of a bulk insert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkInsertReport {
    /// Ids committed, in insertion order
    pub inserted_ids: Vec<String>,
    /// (input position, error message) for rejected records
    pub failed: Vec<(usize, String)>,
    /// True when the deadline cut the batch short
    pub timed_out: bool,
}

/// A named set of records with secondary indexes
pub struct Collection {
    name: String,
    records: BTreeMap<String, Document>,
    indexes: BTreeMap<String, SecondaryIndex>,
    bus: Arc<ChangeBus>,
    journal: Option<Arc<dyn Journal>>,
    id_alloc: Arc<IdAllocator>,
    limits: Limits,
}

impl Collection {
    /// Create an empty collection
    pub fn new(
        name: impl Into<String>,
        bus: Arc<ChangeBus>,
        journal: Option<Arc<dyn Journal>>,
        id_alloc: Arc<IdAllocator>,
        limits: Limits,
    ) -> Self {
        Self {
            name: name.into(),
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            bus,
            journal,
            id_alloc,
            limits,
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the collection holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fetch a record by id
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.records.get(id)
    }

    fn journal_entry(&self, operation: &str, data: Value) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(JournalEntry::scoped(operation, &self.name, data))?;
        }
        Ok(())
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Validate and complete a record for insertion, allocating an id if
    /// none was supplied
    fn prepare_insert(&self, mut doc: Document) -> Result<Document> {
        match doc.get(ID_FIELD) {
            None => {
                doc.set(ID_FIELD, self.id_alloc.allocate());
            }
            Some(Value::Str(id)) => {
                validate_key_with_limits(id, &self.limits).map_err(|_| Error::InvalidField {
                    field: ID_FIELD.to_string(),
                    message: "record id must be a non-empty string within limits".into(),
                })?;
                if self.records.contains_key(id.as_str()) {
                    return Err(Error::DuplicateId(id.clone()));
                }
            }
            Some(_) => {
                return Err(Error::InvalidField {
                    field: ID_FIELD.to_string(),
                    message: "record id must be a string".into(),
                })
            }
        }
        Ok(doc)
    }

    /// Insert one record, returning its id
    pub fn insert(&mut self, doc: Document) -> Result<String> {
        let doc = self.prepare_insert(doc)?;
        let id = doc.id().expect("prepare_insert guarantees an id").to_string();
        for index in self.indexes.values() {
            index.check_insert(&id, &doc)?;
        }
        self.journal_entry("insert", Value::Object(doc.clone()))?;
        self.apply_insert(&id, doc.clone())?;
        self.bus.publish(&ChangeEvent::new(
            ChangeType::Insert,
            self.name.clone(),
            Some(doc),
            None,
        ));
        Ok(id)
    }

    fn apply_insert(&mut self, id: &str, doc: Document) -> Result<()> {
        for index in self.indexes.values_mut() {
            index.insert(id, &doc)?;
        }
        self.records.insert(id.to_string(), doc);
        Ok(())
    }

    /// Insert many records with an optional batch size and deadline
    ///
    /// Records are committed one at a time; a failure rejects only that
    /// record, and an elapsed deadline stops the batch. Everything
    /// committed before the stop is kept and reported.
    pub fn insert_many(
        &mut self,
        docs: Vec<Document>,
        batch_size: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<BulkInsertReport> {
        let batch_size = batch_size.unwrap_or(self.limits.default_batch_size).max(1);
        let started = Instant::now();
        let mut report = BulkInsertReport::default();
        for (position, doc) in docs.into_iter().enumerate() {
            if position % batch_size == 0 {
                if let Some(deadline) = timeout {
                    if started.elapsed() >= deadline {
                        report.timed_out = true;
                        break;
                    }
                }
            }
            match self.insert(doc) {
                Ok(id) => report.inserted_ids.push(id),
                Err(e) => report.failed.push((position, e.to_string())),
            }
        }
        Ok(report)
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Apply a change set to one record
    ///
    /// A change set containing update operators (`$set`, `$unset`,
    /// `$inc`, `$push`, `$pull`) modifies the record in place; anything
    /// else replaces the record wholesale. `_id` is preserved either way.
    fn apply_changes(old: &Document, changes: &Document) -> Result<Document> {
        let has_operators = changes.keys().any(|k| k.starts_with('$'));
        let mut new = if has_operators {
            let mut new = old.clone();
            for (op, spec) in changes.iter() {
                let spec = spec.as_object().ok_or_else(|| Error::InvalidArgument(
                    format!("{op} takes an object of field paths"),
                ))?;
                match op.as_str() {
                    "$set" => {
                        for (path, value) in spec.iter() {
                            monarch_core::set_path(&mut new, path, value.clone());
                        }
                    }
                    "$unset" => {
                        for (path, _) in spec.iter() {
                            monarch_core::remove_path(&mut new, path);
                        }
                    }
                    "$inc" => {
                        for (path, delta) in spec.iter() {
                            let current = new.get_path(path).cloned().unwrap_or(Value::Int(0));
                            let next = match (&current, delta) {
                                (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
                                _ => match (current.as_f64(), delta.as_f64()) {
                                    (Some(a), Some(b)) => Value::Float(a + b),
                                    _ => {
                                        return Err(Error::InvalidField {
                                            field: path.clone(),
                                            message: "$inc requires numeric values".into(),
                                        })
                                    }
                                },
                            };
                            monarch_core::set_path(&mut new, path, next);
                        }
                    }
                    "$push" => {
                        for (path, value) in spec.iter() {
                            let mut items = match new.get_path(path) {
                                Some(Value::Array(items)) => items.clone(),
                                None => Vec::new(),
                                Some(_) => {
                                    return Err(Error::InvalidField {
                                        field: path.clone(),
                                        message: "$push target is not an array".into(),
                                    })
                                }
                            };
                            items.push(value.clone());
                            monarch_core::set_path(&mut new, path, Value::Array(items));
                        }
                    }
                    "$pull" => {
                        for (path, value) in spec.iter() {
                            if let Some(Value::Array(items)) = new.get_path(path) {
                                let kept: Vec<Value> = items
                                    .iter()
                                    .filter(|i| !monarch_core::values_equal(i, value))
                                    .cloned()
                                    .collect();
                                monarch_core::set_path(&mut new, path, Value::Array(kept));
                            }
                        }
                    }
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "unknown update operator: {other}"
                        )))
                    }
                }
            }
            new
        } else {
            changes.clone()
        };
        if let Some(id) = old.get(ID_FIELD) {
            new.set(ID_FIELD, id.clone());
        }
        Ok(new)
    }

    /// Update every record matching `query`, returning how many changed
    pub fn update(&mut self, query: &Document, changes: &Document) -> Result<usize> {
        let targets: Vec<(String, Document)> = self
            .records
            .iter()
            .filter(|(_, doc)| matches(doc, query))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        let mut updated = 0;
        for (id, old) in targets {
            let new = Self::apply_changes(&old, changes)?;
            for index in self.indexes.values() {
                index.check_insert(&id, &new)?;
            }
            self.journal_entry("update", Value::Object(new.clone()))?;
            for index in self.indexes.values_mut() {
                index.update(&id, &old, &new)?;
            }
            self.records.insert(id.clone(), new.clone());
            self.bus.publish(&ChangeEvent::new(
                ChangeType::Update,
                self.name.clone(),
                Some(new),
                Some(old),
            ));
            updated += 1;
        }
        Ok(updated)
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Remove every record matching `query`, returning how many went away
    pub fn remove(&mut self, query: &Document) -> Result<usize> {
        let targets: Vec<String> = self
            .records
            .iter()
            .filter(|(_, doc)| matches(doc, query))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &targets {
            self.remove_by_id(id)?;
        }
        Ok(targets.len())
    }

    /// Remove one record by id
    pub fn remove_by_id(&mut self, id: &str) -> Result<Document> {
        if !self.records.contains_key(id) {
            return Err(Error::NotFound {
                entity: "record",
                name: id.to_string(),
            });
        }
        let mut data = Document::new();
        data.set(ID_FIELD, id.to_string());
        self.journal_entry("remove", Value::Object(data))?;
        let old = self
            .records
            .remove(id)
            .expect("presence checked above");
        for index in self.indexes.values_mut() {
            index.remove(id, &old);
        }
        self.bus.publish(&ChangeEvent::new(
            ChangeType::Remove,
            self.name.clone(),
            None,
            Some(old.clone()),
        ));
        Ok(old)
    }

    // ========================================================================
    // Find
    // ========================================================================

    /// Equality values a query pins `field` to, when it does
    fn equality_values(query: &Document, field: &str) -> Option<Vec<Value>> {
        match query.get(field)? {
            Value::Object(cond) if cond.keys().any(|k| k.starts_with('$')) => {
                let mut values = Vec::new();
                for (op, operand) in cond.iter() {
                    match op.as_str() {
                        "$eq" => values.push(operand.clone()),
                        "$in" => values.extend(operand.as_array()?.iter().cloned()),
                        _ => return None,
                    }
                }
                Some(values)
            }
            literal => Some(vec![literal.clone()]),
        }
    }

    /// Candidate ids for an index-lookup plan step
    fn index_candidates(&self, index_name: &str, fields: &[String], query: &Document) -> Vec<String> {
        let Some(index) = self.indexes.get(index_name) else {
            return self.records.keys().cloned().collect();
        };
        // Equality/$in on every field: look keys up directly, walking the
        // cartesian product of the per-field alternatives.
        let per_field: Option<Vec<Vec<Value>>> = fields
            .iter()
            .map(|f| Self::equality_values(query, f))
            .collect();
        if let Some(per_field) = per_field {
            let mut keys: Vec<Vec<Value>> = vec![Vec::new()];
            for alternatives in per_field {
                let mut next = Vec::with_capacity(keys.len() * alternatives.len().max(1));
                for prefix in &keys {
                    for alt in &alternatives {
                        let mut key = prefix.clone();
                        key.push(alt.clone());
                        next.push(key);
                    }
                }
                keys = next;
            }
            let mut ids = Vec::new();
            for key in keys {
                ids.extend(index.ids_for_values(&key));
            }
            ids.sort();
            ids.dedup();
            return ids;
        }
        // Single-field range: scan the ordered keyspace, re-checking the
        // field condition against each decoded key.
        if fields.len() == 1 {
            if let Some(condition) = query.get(&fields[0]) {
                let condition = condition.clone();
                return index.scan(move |values| {
                    let Some(first) = values.first() else {
                        return false;
                    };
                    let mut probe = Document::new();
                    probe.set("k", first.clone());
                    let mut q = Document::new();
                    q.set("k", condition.clone());
                    matches(&probe, &q)
                });
            }
        }
        self.records.keys().cloned().collect()
    }

    /// Planner view of the non-text indexes
    fn index_infos(&self) -> Vec<IndexInfo> {
        self.indexes
            .values()
            .filter(|i| !i.def().text)
            .map(|i| IndexInfo {
                name: i.def().name.clone(),
                fields: i.def().fields.clone(),
                unique: i.def().unique,
                key_count: i.key_count(),
            })
            .collect()
    }

    /// Find records matching `query`
    pub fn find(&self, query: &Document, options: &FindOptions) -> Result<Vec<Document>> {
        let chosen = plan(self.records.len(), query, &self.index_infos());
        let lookup = chosen.steps.iter().find_map(|s| match &s.kind {
            StepKind::IndexLookup { index, fields } => Some((index.clone(), fields.clone())),
            _ => None,
        });
        debug!(
            collection = self.name.as_str(),
            index = lookup.as_ref().map(|(i, _)| i.as_str()).unwrap_or("<full scan>"),
            "find"
        );

        let mut result: Vec<Document> = match &lookup {
            Some((index_name, fields)) => self
                .index_candidates(index_name, fields, query)
                .iter()
                .filter_map(|id| self.records.get(id))
                .filter(|doc| matches(doc, query))
                .cloned()
                .collect(),
            None => match options.sort {
                // No sort: records arrive in id order and limit can
                // short-circuit the scan.
                None => self
                    .records
                    .values()
                    .filter(|doc| matches(doc, query))
                    .skip(options.skip)
                    .take(options.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect(),
                Some(_) => self
                    .records
                    .values()
                    .filter(|doc| matches(doc, query))
                    .cloned()
                    .collect(),
            },
        };

        let pre_paginated = lookup.is_none() && options.sort.is_none();
        if let Some(sort) = &options.sort {
            let keys = monarch_query::parse_sort_spec(sort)?;
            monarch_query::sort_documents(&mut result, &keys);
        }
        if !pre_paginated {
            if options.skip > 0 {
                result = result.split_off(options.skip.min(result.len()));
            }
            if let Some(limit) = options.limit {
                result.truncate(limit);
            }
        }
        if let Some(projection) = &options.projection {
            result = result
                .iter()
                .map(|doc| project_document(doc, projection))
                .collect();
        }
        Ok(result)
    }

    /// First record matching `query`
    pub fn find_one(&self, query: &Document) -> Result<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find(query, &options)?.into_iter().next())
    }

    /// Number of records matching `query`
    pub fn count(&self, query: &Document) -> usize {
        if query.is_empty() {
            return self.records.len();
        }
        self.records.values().filter(|doc| matches(doc, query)).count()
    }

    /// Run an aggregation pipeline over the collection
    pub fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>> {
        let docs = self.records.values().cloned().collect();
        monarch_query::run_pipeline(docs, pipeline)
    }

    /// Search the collection's text index
    pub fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(Document, f64)>> {
        let index = self
            .indexes
            .values()
            .find_map(|i| i.text_index())
            .ok_or_else(|| Error::NotFound {
                entity: "index",
                name: format!("text index on collection {}", self.name),
            })?;
        Ok(index
            .search(query, limit)
            .into_iter()
            .filter_map(|hit| {
                self.records
                    .get(&hit.id)
                    .map(|doc| (doc.clone(), hit.score))
            })
            .collect())
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Create a secondary index over `fields`
    ///
    /// The index is built over the existing records before it is
    /// registered or journalled, so a unique violation in existing data
    /// leaves the collection untouched.
    pub fn create_index(&mut self, fields: Vec<String>, options: IndexOptions) -> Result<String> {
        if fields.is_empty() {
            return Err(Error::InvalidArgument("index needs at least one field".into()));
        }
        if fields.len() > self.limits.max_index_fields {
            return Err(Error::ResourceLimit(format!(
                "index spans {} fields, maximum is {}",
                fields.len(),
                self.limits.max_index_fields
            )));
        }
        let name = options.name.unwrap_or_else(|| IndexDef::default_name(&fields));
        if self.indexes.contains_key(&name) {
            return Err(Error::DuplicateId(name));
        }
        let def = IndexDef {
            name: name.clone(),
            fields,
            unique: options.unique,
            sparse: options.sparse,
            text: options.text,
            ttl_seconds: options.ttl_seconds,
        };
        let mut index = SecondaryIndex::new(def.clone());
        for (id, doc) in &self.records {
            index.insert(id, doc)?;
        }
        self.journal_entry(
            "createIndex",
            Value::from_json(serde_json::to_value(&def)?),
        )?;
        self.indexes.insert(name.clone(), index);
        Ok(name)
    }

    /// Drop an index by name
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        if !self.indexes.contains_key(name) {
            return Err(Error::index_not_found(name));
        }
        let mut data = Document::new();
        data.set("name", name.to_string());
        self.journal_entry("dropIndex", Value::Object(data))?;
        self.indexes.remove(name);
        Ok(())
    }

    /// Definitions of every index
    pub fn index_defs(&self) -> Vec<IndexDef> {
        self.indexes.values().map(|i| i.def().clone()).collect()
    }

    /// Remove records whose TTL-indexed entries have expired
    ///
    /// Returns the removed ids. Each removal is journalled and published
    /// like an ordinary remove.
    pub fn cleanup_expired(&mut self, now: i64) -> Result<Vec<String>> {
        let mut expired: Vec<String> = self
            .indexes
            .values()
            .flat_map(|i| i.expired_ids(now))
            .collect();
        expired.sort();
        expired.dedup();
        for id in &expired {
            self.remove_by_id(id)?;
        }
        Ok(expired)
    }

    // ========================================================================
    // Recovery and snapshot support
    // ========================================================================

    /// All records, for snapshotting
    pub fn export_records(&self) -> Vec<Document> {
        self.records.values().cloned().collect()
    }

    /// Re-create an index from its persisted definition, without
    /// journalling
    pub fn restore_index(&mut self, def: IndexDef) -> Result<()> {
        let mut index = SecondaryIndex::new(def.clone());
        for (id, doc) in &self.records {
            index.insert(id, doc)?;
        }
        self.indexes.insert(def.name.clone(), index);
        Ok(())
    }

    /// Apply an insert during WAL replay: no journal, no events
    pub fn replay_insert(&mut self, doc: Document) -> Result<()> {
        let id = doc
            .id()
            .ok_or_else(|| Error::Integrity("replayed insert without _id".into()))?
            .to_string();
        self.apply_insert(&id, doc)
    }

    /// Apply an update during WAL replay
    pub fn replay_update(&mut self, doc: Document) -> Result<()> {
        let id = doc
            .id()
            .ok_or_else(|| Error::Integrity("replayed update without _id".into()))?
            .to_string();
        match self.records.get(&id).cloned() {
            Some(old) => {
                for index in self.indexes.values_mut() {
                    index.update(&id, &old, &doc)?;
                }
                self.records.insert(id, doc);
                Ok(())
            }
            None => self.apply_insert(&id, doc),
        }
    }

    /// Drop an index during WAL replay: no journal
    pub fn replay_drop_index(&mut self, name: &str) {
        self.indexes.remove(name);
    }

    /// Apply a remove during WAL replay
    pub fn replay_remove(&mut self, id: &str) -> Result<()> {
        if let Some(old) = self.records.remove(id) {
            for index in self.indexes.values_mut() {
                index.remove(id, &old);
            }
        }
        Ok(())
    }

    /// Verify the index/record invariants, returning violations
    ///
    /// Used by tests and the integrity check after recovery: every
    /// record must be covered by every index (modulo sparseness), and
    /// unique indexes must hold at most one id per key.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for index in self.indexes.values() {
            if index.def().text {
                continue;
            }
            for (id, doc) in &self.records {
                if !index.covers(id, doc) {
                    problems.push(format!(
                        "index '{}' missing entry for record '{}'",
                        index.def().name,
                        id
                    ));
                }
            }
            if index.def().unique {
                for key in index.keys_with_multiple_ids() {
                    problems.push(format!(
                        "unique index '{}' holds multiple ids for key {}",
                        index.def().name,
                        key
                    ));
                }
            }
        }
        problems
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("records", &self.records.len())
            .field("indexes", &self.indexes.len())
            .finish()
    }
}
