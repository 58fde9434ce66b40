//! The Monarch database facade
//!
//! One `Database` binds the collection store, the container key space,
//! the change bus, and the durability layer. Mutations hold a writer
//! lock for their whole journal → apply → index → publish sequence, so
//! readers always observe whole operations and subscribers see events
//! in apply order.
//!
//! With a data directory the instance locks it exclusively, journals to
//! `wal.log`, checkpoints into `checkpoints/`, and recovers on open by
//! loading the newest checkpoint and replaying the log tail. Without a
//! data directory the instance is purely in-memory.

use crate::config::DatabaseConfig;
use monarch_core::{
    validate_key_with_limits, Document, Error, IdAllocator, Result, Value,
};
use monarch_durability::{
    archive_older_than, recover, recover_to, CheckpointManager, CollectionSnapshot, DirLock,
    DurabilityLevel, PersistenceAdapter, RecoveryOutcome, Snapshot, WalEntry, WalWriter,
};
use monarch_primitives::{
    ContainerKind, ContainerStore, Direction, GeoRadiusHit, GeoRadiusOptions, Sample, StreamId,
    TraverseOptions, TraverseResult, VectorMatch,
};
use monarch_storage::{
    BulkInsertReport, ChangeBus, ChangeEvent, ChangeType, Collection, FindOptions, IndexDef,
    IndexOptions, Journal, JournalEntry, Subscription, SubscriptionFilter,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Pseudo-collection name container events are published under
pub const CONTAINER_EVENTS: &str = "_containers";

const WAL_FILE: &str = "wal.log";
const ARCHIVE_FILE: &str = "archive.log";
const CHECKPOINT_DIR: &str = "checkpoints";

/// Journal implementation backed by the WAL
struct WalJournal {
    wal: Arc<Mutex<WalWriter>>,
}

impl Journal for WalJournal {
    fn append(&self, entry: JournalEntry) -> Result<u64> {
        self.wal
            .lock()
            .append(&entry.operation, entry.collection, entry.data)
    }
}

struct DurabilityState {
    wal: Arc<Mutex<WalWriter>>,
    checkpoints: CheckpointManager,
    wal_path: PathBuf,
    archive_path: PathBuf,
    _lock: DirLock,
}

/// Aggregate counters for `stats()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of collections
    pub collections: usize,
    /// Records across all collections
    pub records: usize,
    /// Secondary indexes across all collections
    pub indexes: usize,
    /// Container keys by kind
    pub containers: BTreeMap<&'static str, usize>,
    /// Last journalled WAL position, when durable
    pub wal_position: Option<u64>,
    /// Checkpoints currently retained
    pub checkpoints: usize,
    /// Live change-stream subscribers
    pub subscribers: usize,
}

/// Result of `health_check()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// True when no issues were found
    pub healthy: bool,
    /// Human-readable findings
    pub issues: Vec<String>,
}

/// An embedded multi-model database instance
pub struct Database {
    instance_id: Uuid,
    config: DatabaseConfig,
    collections: RwLock<BTreeMap<String, Collection>>,
    containers: RwLock<ContainerStore>,
    bus: Arc<ChangeBus>,
    id_alloc: Arc<IdAllocator>,
    journal: Option<Arc<dyn Journal>>,
    durability: Option<DurabilityState>,
}

impl Database {
    /// Open a database with the given configuration
    ///
    /// With a data directory this acquires the directory lock, opens
    /// the WAL, and runs recovery before returning.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let (durability, journal) = match &config.data_dir {
            Some(dir) => {
                let lock = DirLock::acquire(dir)?;
                let wal_path = dir.join(WAL_FILE);
                let archive_path = dir.join(ARCHIVE_FILE);
                let checkpoints =
                    CheckpointManager::new(dir.join(CHECKPOINT_DIR), config.max_checkpoints)?;
                let wal = Arc::new(Mutex::new(WalWriter::open(&wal_path, config.durability)?));
                let journal: Arc<dyn Journal> = Arc::new(WalJournal { wal: wal.clone() });
                (
                    Some(DurabilityState {
                        wal,
                        checkpoints,
                        wal_path,
                        archive_path,
                        _lock: lock,
                    }),
                    Some(journal),
                )
            }
            None => (None, None),
        };

        let db = Self {
            instance_id: Uuid::new_v4(),
            bus: Arc::new(ChangeBus::new(config.queue_capacity)),
            id_alloc: Arc::new(IdAllocator::new()),
            collections: RwLock::new(BTreeMap::new()),
            containers: RwLock::new(ContainerStore::new()),
            journal,
            durability,
            config,
        };

        if let Some(state) = &db.durability {
            let archive = state.archive_path.exists().then_some(state.archive_path.as_path());
            let outcome = recover(&state.wal_path, &state.checkpoints, archive)?;
            db.apply_recovery(outcome)?;
            info!(instance = %db.instance_id, "database opened with durability");
        }
        Ok(db)
    }

    /// Open an ephemeral in-memory database
    pub fn in_memory() -> Self {
        Self::open(DatabaseConfig::default()).expect("in-memory open cannot fail")
    }

    /// This instance's unique id
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    fn new_collection(&self, name: &str) -> Collection {
        Collection::new(
            name,
            self.bus.clone(),
            self.journal.clone(),
            self.id_alloc.clone(),
            self.config.limits.clone(),
        )
    }

    fn journal_raw(&self, operation: &str, collection: Option<&str>, data: Value) -> Result<u64> {
        match &self.journal {
            Some(journal) => journal.append(JournalEntry {
                operation: operation.to_string(),
                collection: collection.map(str::to_string),
                data,
            }),
            None => Ok(0),
        }
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create a collection; conflict if it already exists
    pub fn add_collection(&self, name: &str) -> Result<()> {
        validate_key_with_limits(name, &self.config.limits)?;
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::DuplicateId(name.to_string()));
        }
        self.journal_raw("createCollection", Some(name), Value::Null)?;
        collections.insert(name.to_string(), self.new_collection(name));
        Ok(())
    }

    /// Drop a collection, its indexes, and its scoped subscribers
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if !collections.contains_key(name) {
            return Err(Error::collection_not_found(name));
        }
        self.journal_raw("dropCollection", Some(name), Value::Null)?;
        collections.remove(name);
        self.bus.drop_collection_subscribers(name);
        Ok(())
    }

    /// Names of all collections
    pub fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Run a mutating closure against a collection, creating it on
    /// demand
    fn with_collection_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Collection) -> Result<R>,
    ) -> Result<R> {
        let mut collections = self.collections.write();
        if !collections.contains_key(name) {
            validate_key_with_limits(name, &self.config.limits)?;
            self.journal_raw("createCollection", Some(name), Value::Null)?;
            collections.insert(name.to_string(), self.new_collection(name));
        }
        f(collections.get_mut(name).expect("inserted above"))
    }

    /// Insert one record, returning its id
    pub fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        self.with_collection_mut(collection, |c| c.insert(doc))
    }

    /// Bulk insert with optional batch size and deadline
    pub fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
        batch_size: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<BulkInsertReport> {
        self.with_collection_mut(collection, |c| c.insert_many(docs, batch_size, timeout))
    }

    /// Update matching records; 0 when the collection does not exist
    pub fn update(&self, collection: &str, query: &Document, changes: &Document) -> Result<usize> {
        match self.collections.write().get_mut(collection) {
            Some(c) => c.update(query, changes),
            None => Ok(0),
        }
    }

    /// Remove matching records; 0 when the collection does not exist
    pub fn remove(&self, collection: &str, query: &Document) -> Result<usize> {
        match self.collections.write().get_mut(collection) {
            Some(c) => c.remove(query),
            None => Ok(0),
        }
    }

    /// Find matching records; empty when the collection does not exist
    pub fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        match self.collections.read().get(collection) {
            Some(c) => c.find(query, options),
            None => Ok(Vec::new()),
        }
    }

    /// First matching record
    pub fn find_one(&self, collection: &str, query: &Document) -> Result<Option<Document>> {
        match self.collections.read().get(collection) {
            Some(c) => c.find_one(query),
            None => Ok(None),
        }
    }

    /// Count matching records
    pub fn count(&self, collection: &str, query: &Document) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.count(query))
    }

    /// Run an aggregation pipeline
    pub fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>> {
        match self.collections.read().get(collection) {
            Some(c) => c.aggregate(pipeline),
            None => Ok(Vec::new()),
        }
    }

    /// Full-text search against the collection's text index
    pub fn search_text(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Document, f64)>> {
        match self.collections.read().get(collection) {
            Some(c) => c.search_text(query, limit),
            None => Err(Error::collection_not_found(collection)),
        }
    }

    /// Create a secondary index
    pub fn create_index(
        &self,
        collection: &str,
        fields: Vec<String>,
        options: IndexOptions,
    ) -> Result<String> {
        self.with_collection_mut(collection, |c| c.create_index(fields, options))
    }

    /// Drop an index
    pub fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        match self.collections.write().get_mut(collection) {
            Some(c) => c.drop_index(name),
            None => Err(Error::collection_not_found(collection)),
        }
    }

    /// Index definitions for a collection
    pub fn list_indexes(&self, collection: &str) -> Vec<IndexDef> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.index_defs())
            .unwrap_or_default()
    }

    /// Sweep TTL indexes, removing expired records everywhere
    ///
    /// Returns `(collection, id)` pairs for everything removed.
    pub fn cleanup_expired(&self) -> Result<Vec<(String, String)>> {
        let now = monarch_core::now_millis();
        let mut removed = Vec::new();
        let mut collections = self.collections.write();
        for (name, collection) in collections.iter_mut() {
            for id in collection.cleanup_expired(now)? {
                removed.push((name.clone(), id));
            }
        }
        Ok(removed)
    }

    // ========================================================================
    // Change stream
    // ========================================================================

    /// Subscribe to change events
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Remove a subscriber
    pub fn unsubscribe(&self, id: u64) {
        self.bus.unsubscribe(id)
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// Kind a mutating container operation needs its key to hold
    fn expected_kind(op: &str) -> Option<ContainerKind> {
        Some(match op {
            "lpush" | "rpush" | "lpop" | "rpop" | "lset" | "ltrim" => ContainerKind::List,
            "sadd" | "srem" => ContainerKind::Set,
            "hset" | "hdel" | "hincrby" => ContainerKind::Hash,
            "zadd" | "zrem" | "zincrby" => ContainerKind::SortedSet,
            "xadd" | "xtrim_maxlen" | "xtrim_minid" => ContainerKind::Stream,
            "geoadd" | "georem" => ContainerKind::Geo,
            "tsadd" => ContainerKind::TimeSeries,
            "vadd" | "vdel" => ContainerKind::Vector,
            "gaddnode" | "gaddedge" | "gdelnode" | "gdeledge" => ContainerKind::Graph,
            _ => return None,
        })
    }

    /// Run a mutating container operation: journal, apply, publish
    pub fn container_op(&self, op: &str, key: &str, args: Vec<Value>) -> Result<Value> {
        // Fail cheap kind mismatches before anything reaches the journal
        if let (Some(expected), Some(found)) =
            (Self::expected_kind(op), self.containers.read().kind_of(key))
        {
            if expected != found {
                return Err(Error::WrongContainerKind {
                    key: key.to_string(),
                    expected: expected.as_str(),
                    found: found.as_str(),
                });
            }
        }
        // Resolve `xadd *` up front so the journalled args replay
        // deterministically
        let args = if op == "xadd" && args.first().and_then(Value::as_str) == Some("*") {
            let id = self.containers.read().stream_resolve_id(key, "*")?;
            let mut resolved = args.clone();
            resolved[0] = Value::Str(id.to_string());
            resolved
        } else {
            args
        };

        let mut containers = self.containers.write();
        let mut data = Document::new();
        data.set("op", op.to_string());
        data.set("key", key.to_string());
        data.set("args", Value::Array(args.clone()));
        self.journal_raw("containerOp", None, Value::Object(data.clone()))?;
        let result = containers.apply(op, key, &args)?;
        drop(containers);

        self.bus.publish(&ChangeEvent::new(
            ChangeType::Update,
            CONTAINER_EVENTS,
            Some(data),
            None,
        ));
        Ok(result)
    }

    // --- Lists ---

    /// Push values onto the head of a list
    pub fn lpush(&self, key: &str, values: Vec<Value>) -> Result<usize> {
        Ok(self.container_op("lpush", key, values)?.as_i64().unwrap_or(0) as usize)
    }

    /// Push values onto the tail of a list
    pub fn rpush(&self, key: &str, values: Vec<Value>) -> Result<usize> {
        Ok(self.container_op("rpush", key, values)?.as_i64().unwrap_or(0) as usize)
    }

    /// Pop from the head; `None` when empty or missing
    pub fn lpop(&self, key: &str) -> Result<Option<Value>> {
        match self.container_op("lpop", key, Vec::new())? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    /// Pop from the tail
    pub fn rpop(&self, key: &str) -> Result<Option<Value>> {
        match self.container_op("rpop", key, Vec::new())? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    /// Elements between two possibly-negative indices
    pub fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        Ok(self
            .containers
            .read()
            .list(key)?
            .map(|l| l.lrange(start, end))
            .unwrap_or_default())
    }

    /// List length
    pub fn llen(&self, key: &str) -> Result<usize> {
        Ok(self.containers.read().list(key)?.map_or(0, |l| l.llen()))
    }

    /// Trim a list to `start..=end`
    pub fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<()> {
        self.container_op("ltrim", key, vec![Value::Int(start), Value::Int(end)])?;
        Ok(())
    }

    // --- Sets ---

    /// Add members to a set
    pub fn sadd(&self, key: &str, values: Vec<Value>) -> Result<usize> {
        Ok(self.container_op("sadd", key, values)?.as_i64().unwrap_or(0) as usize)
    }

    /// Remove members from a set
    pub fn srem(&self, key: &str, values: Vec<Value>) -> Result<usize> {
        Ok(self.container_op("srem", key, values)?.as_i64().unwrap_or(0) as usize)
    }

    /// Set members
    pub fn smembers(&self, key: &str) -> Result<Vec<Value>> {
        Ok(self
            .containers
            .read()
            .set(key)?
            .map(|s| s.smembers())
            .unwrap_or_default())
    }

    /// Set membership test
    pub fn sismember(&self, key: &str, value: &Value) -> Result<bool> {
        Ok(self
            .containers
            .read()
            .set(key)?
            .map_or(false, |s| s.sismember(value)))
    }

    // --- Hashes ---

    /// Set hash fields
    pub fn hset(&self, key: &str, fields: Document) -> Result<usize> {
        Ok(self
            .container_op("hset", key, vec![Value::Object(fields)])?
            .as_i64()
            .unwrap_or(0) as usize)
    }

    /// Fetch one hash field
    pub fn hget(&self, key: &str, field: &str) -> Result<Option<Value>> {
        Ok(self
            .containers
            .read()
            .hash(key)?
            .and_then(|h| h.hget(field).cloned()))
    }

    /// All hash fields and values
    pub fn hgetall(&self, key: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .containers
            .read()
            .hash(key)?
            .map(|h| h.hgetall())
            .unwrap_or_default())
    }

    // --- Sorted sets ---

    /// Add scored members
    pub fn zadd(&self, key: &str, entries: Vec<(String, f64)>) -> Result<usize> {
        let mut spec = Document::new();
        for (member, score) in entries {
            spec.set(member, Value::Float(score));
        }
        Ok(self
            .container_op("zadd", key, vec![Value::Object(spec)])?
            .as_i64()
            .unwrap_or(0) as usize)
    }

    /// Members between two ranks, with scores
    pub fn zrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<(String, f64)>> {
        Ok(self
            .containers
            .read()
            .zset(key)?
            .map(|z| z.zrange(start, end))
            .unwrap_or_default())
    }

    /// Members in a score window
    pub fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<(String, f64)>> {
        Ok(self
            .containers
            .read()
            .zset(key)?
            .map(|z| z.zrangebyscore(min, max))
            .unwrap_or_default())
    }

    /// A member's score
    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self
            .containers
            .read()
            .zset(key)?
            .and_then(|z| z.zscore(member)))
    }

    /// Add to a member's score
    pub fn zincrby(&self, key: &str, delta: f64, member: &str) -> Result<f64> {
        self.container_op(
            "zincrby",
            key,
            vec![Value::Float(delta), Value::Str(member.to_string())],
        )?
        .as_f64()
        .ok_or_else(|| Error::Integrity("zincrby returned a non-number".into()))
    }

    /// A member's ascending rank
    pub fn zrank(&self, key: &str, member: &str) -> Result<Option<usize>> {
        Ok(self
            .containers
            .read()
            .zset(key)?
            .and_then(|z| z.zrank(member)))
    }

    // --- Streams ---

    /// Append a stream entry; `*` assigns the next id
    pub fn xadd(&self, key: &str, id_spec: &str, fields: Document) -> Result<StreamId> {
        let result = self.container_op(
            "xadd",
            key,
            vec![Value::Str(id_spec.to_string()), Value::Object(fields)],
        )?;
        result
            .as_str()
            .ok_or_else(|| Error::Integrity("xadd returned a non-string id".into()))?
            .parse()
    }

    /// Stream entries between two bound specs
    pub fn xrange(&self, key: &str, start: &str, end: &str) -> Result<Vec<(StreamId, Document)>> {
        self.containers.read().xrange(key, start, end)
    }

    /// Stream length
    pub fn xlen(&self, key: &str) -> Result<usize> {
        Ok(self.containers.read().stream(key)?.map_or(0, |s| s.xlen()))
    }

    /// Trim a stream to at most `maxlen` entries
    pub fn xtrim_maxlen(&self, key: &str, maxlen: usize) -> Result<usize> {
        Ok(self
            .container_op("xtrim_maxlen", key, vec![Value::Int(maxlen as i64)])?
            .as_i64()
            .unwrap_or(0) as usize)
    }

    // --- Geo ---

    /// Add members with coordinates
    pub fn geoadd(&self, key: &str, entries: Vec<(String, f64, f64)>) -> Result<usize> {
        let args = entries
            .into_iter()
            .map(|(member, lon, lat)| {
                Value::Array(vec![
                    Value::Str(member),
                    Value::Float(lon),
                    Value::Float(lat),
                ])
            })
            .collect();
        Ok(self.container_op("geoadd", key, args)?.as_i64().unwrap_or(0) as usize)
    }

    /// Distance between two members in kilometres
    pub fn geodist(&self, key: &str, a: &str, b: &str) -> Result<Option<f64>> {
        Ok(self.containers.read().geo(key)?.and_then(|g| g.geodist(a, b)))
    }

    /// Members within a radius of a point
    pub fn georadius(
        &self,
        key: &str,
        lon: f64,
        lat: f64,
        radius_km: f64,
        options: GeoRadiusOptions,
    ) -> Result<Vec<GeoRadiusHit>> {
        match self.containers.read().geo(key)? {
            Some(geo) => geo.georadius(lon, lat, radius_km, options),
            None => Ok(Vec::new()),
        }
    }

    // --- Time series ---

    /// Add a sample
    pub fn tsadd(
        &self,
        key: &str,
        timestamp: i64,
        value: f64,
        labels: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut label_doc = Document::new();
        for (k, v) in labels {
            label_doc.set(k, Value::Str(v));
        }
        self.container_op(
            "tsadd",
            key,
            vec![
                Value::Int(timestamp),
                Value::Float(value),
                Value::Object(label_doc),
            ],
        )?;
        Ok(())
    }

    /// Samples in an inclusive time window
    pub fn tsrange(&self, key: &str, from: i64, to: i64) -> Result<Vec<Sample>> {
        Ok(self
            .containers
            .read()
            .timeseries(key)?
            .map(|t| t.tsrange(from, to).to_vec())
            .unwrap_or_default())
    }

    /// Average over an optional window
    pub fn tsavg(&self, key: &str, from: Option<i64>, to: Option<i64>) -> Result<Option<f64>> {
        Ok(self
            .containers
            .read()
            .timeseries(key)?
            .and_then(|t| t.tsavg(from, to)))
    }

    // --- Vectors ---

    /// Add a vector with optional metadata
    pub fn vadd(
        &self,
        key: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Option<Document>,
    ) -> Result<()> {
        let mut args = vec![
            Value::Str(id.to_string()),
            Value::Array(vector.into_iter().map(|v| Value::Float(v as f64)).collect()),
        ];
        if let Some(meta) = metadata {
            args.push(Value::Object(meta));
        }
        self.container_op("vadd", key, args)?;
        Ok(())
    }

    /// Top-k cosine search
    pub fn vsearch(&self, key: &str, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        match self.containers.read().vector(key)? {
            Some(set) => set.vsearch(query, k),
            None => Ok(Vec::new()),
        }
    }

    // --- Graphs ---

    /// Add a node
    pub fn graph_add_node(
        &self,
        key: &str,
        id: &str,
        label: &str,
        properties: Document,
    ) -> Result<()> {
        self.container_op(
            "gaddnode",
            key,
            vec![
                Value::Str(id.to_string()),
                Value::Str(label.to_string()),
                Value::Object(properties),
            ],
        )?;
        Ok(())
    }

    /// Add an edge between existing nodes
    pub fn graph_add_edge(
        &self,
        key: &str,
        id: &str,
        from: &str,
        to: &str,
        edge_type: &str,
        properties: Document,
    ) -> Result<()> {
        self.container_op(
            "gaddedge",
            key,
            vec![
                Value::Str(id.to_string()),
                Value::Str(from.to_string()),
                Value::Str(to.to_string()),
                Value::Str(edge_type.to_string()),
                Value::Object(properties),
            ],
        )?;
        Ok(())
    }

    /// Delete a node and its incident edges
    pub fn graph_delete_node(&self, key: &str, id: &str) -> Result<()> {
        self.container_op("gdelnode", key, vec![Value::Str(id.to_string())])?;
        Ok(())
    }

    /// BFS traversal
    pub fn graph_traverse(
        &self,
        key: &str,
        start: &str,
        options: &TraverseOptions,
    ) -> Result<TraverseResult> {
        match self.containers.read().graph(key)? {
            Some(graph) => graph.traverse(start, options),
            None => Err(Error::NotFound {
                entity: "graph",
                name: key.to_string(),
            }),
        }
    }

    /// Shortest path, BFS or Dijkstra when a weight property is named
    pub fn graph_shortest_path(
        &self,
        key: &str,
        from: &str,
        to: &str,
        weight_property: Option<&str>,
    ) -> Result<Option<(Vec<String>, f64)>> {
        match self.containers.read().graph(key)? {
            Some(graph) => graph.shortest_path(from, to, weight_property),
            None => Err(Error::NotFound {
                entity: "graph",
                name: key.to_string(),
            }),
        }
    }

    /// Neighbours of a node
    pub fn graph_neighbors(
        &self,
        key: &str,
        node: &str,
        direction: Direction,
        edge_types: Option<&[String]>,
    ) -> Result<Vec<(String, String)>> {
        match self.containers.read().graph(key)? {
            Some(graph) => graph.neighbors(node, direction, edge_types),
            None => Err(Error::NotFound {
                entity: "graph",
                name: key.to_string(),
            }),
        }
    }

    /// Power-iteration centrality scores
    pub fn graph_centrality(
        &self,
        key: &str,
        iterations: usize,
        damping: f64,
    ) -> Result<std::collections::HashMap<String, f64>> {
        Ok(self
            .containers
            .read()
            .graph(key)?
            .map(|g| g.centrality(iterations, damping))
            .unwrap_or_default())
    }

    // --- Generic container access ---

    /// Delete a container key
    pub fn del(&self, key: &str) -> Result<bool> {
        match self.container_op("del", key, Vec::new())? {
            Value::Bool(existed) => Ok(existed),
            _ => Ok(false),
        }
    }

    /// Container key existence
    pub fn exists(&self, key: &str) -> bool {
        self.containers.read().exists(key)
    }

    // ========================================================================
    // Durability
    // ========================================================================

    fn build_snapshot(&self, wal_position: u64) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new(wal_position);
        let collections = self.collections.read();
        for (name, collection) in collections.iter() {
            let index_defs = collection
                .index_defs()
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            snapshot.collections.insert(
                name.clone(),
                CollectionSnapshot {
                    records: collection.export_records(),
                    index_defs,
                },
            );
        }
        snapshot.containers = serde_json::to_value(&*self.containers.read())?;
        Ok(snapshot)
    }

    fn restore_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut collections = self.collections.write();
        collections.clear();
        for (name, persisted) in snapshot.collections {
            let mut collection = self.new_collection(&name);
            for record in persisted.records {
                collection.replay_insert(record)?;
            }
            for def in persisted.index_defs {
                let def: IndexDef = serde_json::from_value(def)
                    .map_err(|e| Error::Integrity(format!("bad index definition: {e}")))?;
                collection.restore_index(def)?;
            }
            collections.insert(name, collection);
        }
        let mut containers = self.containers.write();
        *containers = match snapshot.containers {
            serde_json::Value::Null => ContainerStore::new(),
            value => serde_json::from_value(value)
                .map_err(|e| Error::Integrity(format!("bad container snapshot: {e}")))?,
        };
        Ok(())
    }

    fn replay_entry(&self, entry: &WalEntry) -> Result<()> {
        let collection_name = entry.collection.as_deref();
        match entry.operation.as_str() {
            "createCollection" => {
                if let Some(name) = collection_name {
                    self.collections
                        .write()
                        .entry(name.to_string())
                        .or_insert_with(|| self.new_collection(name));
                }
                Ok(())
            }
            "dropCollection" => {
                if let Some(name) = collection_name {
                    self.collections.write().remove(name);
                }
                Ok(())
            }
            "insert" | "update" | "remove" | "createIndex" | "dropIndex" => {
                let name = collection_name.ok_or_else(|| {
                    Error::Integrity(format!(
                        "{} entry without a collection",
                        entry.operation
                    ))
                })?;
                let mut collections = self.collections.write();
                let collection = collections
                    .entry(name.to_string())
                    .or_insert_with(|| self.new_collection(name));
                match entry.operation.as_str() {
                    "insert" => collection.replay_insert(as_document(&entry.data)?),
                    "update" => collection.replay_update(as_document(&entry.data)?),
                    "remove" => {
                        let doc = as_document(&entry.data)?;
                        let id = doc.id().ok_or_else(|| {
                            Error::Integrity("remove entry without _id".into())
                        })?;
                        collection.replay_remove(id)
                    }
                    "createIndex" => {
                        let def: IndexDef =
                            serde_json::from_value(entry.data.to_json()).map_err(|e| {
                                Error::Integrity(format!("bad index definition: {e}"))
                            })?;
                        collection.restore_index(def)
                    }
                    "dropIndex" => {
                        let doc = as_document(&entry.data)?;
                        if let Some(name) = doc.get("name").and_then(Value::as_str) {
                            collection.replay_drop_index(name);
                        }
                        Ok(())
                    }
                    _ => unreachable!(),
                }
            }
            "containerOp" => {
                let doc = as_document(&entry.data)?;
                let op = doc
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Integrity("containerOp entry without op".into()))?;
                let key = doc
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Integrity("containerOp entry without key".into()))?;
                let args = doc
                    .get("args")
                    .and_then(Value::as_array)
                    .unwrap_or_default();
                self.containers.write().apply(op, key, args)?;
                Ok(())
            }
            other => Err(Error::Integrity(format!("unknown WAL operation: {other}"))),
        }
    }

    fn apply_recovery(&self, outcome: RecoveryOutcome) -> Result<()> {
        self.collections.write().clear();
        *self.containers.write() = ContainerStore::new();
        if let Some(snapshot) = outcome.snapshot {
            self.restore_snapshot(snapshot)?;
        }
        let replay_count = outcome.entries.len();
        for entry in outcome.entries {
            if let Err(e) = self.replay_entry(&entry) {
                warn!(id = entry.id, error = %e, "skipping unreplayable WAL entry");
            }
        }
        if replay_count > 0 || outcome.skipped > 0 {
            info!(
                replayed = replay_count,
                skipped = outcome.skipped,
                "recovery complete"
            );
        }
        Ok(())
    }

    /// Flush the WAL
    pub fn flush(&self) -> Result<()> {
        if let Some(state) = &self.durability {
            state.wal.lock().flush()?;
        }
        Ok(())
    }

    /// Take a checkpoint of the current state
    pub fn checkpoint(&self) -> Result<()> {
        let state = self.durability.as_ref().ok_or_else(|| {
            Error::InvalidArgument("checkpoint requires a data directory".into())
        })?;
        // The snapshot is consistent through everything journalled so far
        let position = {
            let mut wal = state.wal.lock();
            wal.flush()?;
            wal.position().saturating_sub(1)
        };
        let snapshot = self.build_snapshot(position)?;
        let fsync = self.config.durability == DurabilityLevel::Maximum;
        state.checkpoints.write(&snapshot, fsync)?;
        Ok(())
    }

    /// Rebuild state as of wall-clock time `t` (millis)
    pub fn recover_to(&self, t: i64) -> Result<()> {
        let state = self.durability.as_ref().ok_or_else(|| {
            Error::InvalidArgument("recovery requires a data directory".into())
        })?;
        state.wal.lock().flush()?;
        let archive = state.archive_path.exists().then_some(state.archive_path.as_path());
        let outcome = recover_to(t, &state.wal_path, &state.checkpoints, archive)?;
        self.apply_recovery(outcome)
    }

    /// Move WAL entries older than `age` into the archive
    pub fn archive_older_than(&self, age: Duration) -> Result<usize> {
        let state = self.durability.as_ref().ok_or_else(|| {
            Error::InvalidArgument("archival requires a data directory".into())
        })?;
        state.wal.lock().flush()?;
        let cutoff = monarch_core::now_millis() - age.as_millis() as i64;
        archive_older_than(&state.wal_path, &state.archive_path, cutoff)
    }

    /// Serialise all state through a persistence adapter
    pub fn save(&self, adapter: &dyn PersistenceAdapter) -> Result<()> {
        let position = self
            .durability
            .as_ref()
            .map(|s| s.wal.lock().position().saturating_sub(1))
            .unwrap_or(0);
        let snapshot = self.build_snapshot(position)?;
        adapter.save(&serde_json::to_vec(&snapshot)?)
    }

    /// Replace all state from a persistence adapter
    ///
    /// An empty blob (nothing ever saved) leaves the database empty.
    pub fn load(&self, adapter: &dyn PersistenceAdapter) -> Result<()> {
        let blob = adapter.load()?;
        self.collections.write().clear();
        *self.containers.write() = ContainerStore::new();
        if blob.is_empty() {
            return Ok(());
        }
        let snapshot: Snapshot = serde_json::from_slice(&blob)
            .map_err(|e| Error::Integrity(format!("snapshot parse failure: {e}")))?;
        self.restore_snapshot(snapshot)
    }

    /// Flush and release the instance
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Aggregate counters
    pub fn stats(&self) -> DatabaseStats {
        let collections = self.collections.read();
        let records = collections.values().map(|c| c.len()).sum();
        let indexes = collections.values().map(|c| c.index_defs().len()).sum();
        DatabaseStats {
            collections: collections.len(),
            records,
            indexes,
            containers: self.containers.read().counts_by_kind(),
            wal_position: self
                .durability
                .as_ref()
                .map(|s| s.wal.lock().position().saturating_sub(1)),
            checkpoints: self
                .durability
                .as_ref()
                .and_then(|s| s.checkpoints.list().ok())
                .map_or(0, |files| files.len()),
            subscribers: self.bus.subscriber_count(),
        }
    }

    /// Verify invariants across the instance
    pub fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();
        for (name, collection) in self.collections.read().iter() {
            for problem in collection.verify_integrity() {
                issues.push(format!("{name}: {problem}"));
            }
        }
        if let Some(state) = &self.durability {
            if let Err(e) = state.checkpoints.list() {
                issues.push(format!("checkpoint directory unreadable: {e}"));
            }
        }
        HealthReport {
            healthy: issues.is_empty(),
            issues,
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("instance_id", &self.instance_id)
            .field("collections", &self.collections.read().len())
            .field("containers", &self.containers.read().len())
            .field("durable", &self.durability.is_some())
            .finish()
    }
}

fn as_document(value: &Value) -> Result<Document> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Integrity("WAL payload is not a document".into()))
}
