//! Property-graph container
//!
//! Nodes and edges live in independent tables keyed by id; the
//! adjacency index holds edge ids only, never node handles, so cyclic
//! graphs drop cleanly. Traversal is BFS with a visited set. The
//! path-finding and centrality entry points are the classical
//! algorithms: BFS / Dijkstra and damped power iteration.

use monarch_core::{Document, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, VecDeque};

/// A labelled node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node label (kind)
    pub label: String,
    /// Arbitrary properties
    pub properties: Document,
}

/// A typed, directed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    /// Edge type
    pub edge_type: String,
    /// Arbitrary properties
    pub properties: Document,
}

/// Per-node incident edge ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Adjacency {
    outgoing: BTreeSet<String>,
    incoming: BTreeSet<String>,
}

/// Which way to walk edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow edges from `from` to `to`
    #[default]
    Outgoing,
    /// Follow edges backwards
    Incoming,
    /// Both ways
    Both,
}

/// Options for `traverse`
#[derive(Debug, Clone, Default)]
pub struct TraverseOptions {
    /// Stop after this many hops from the start
    pub max_depth: Option<usize>,
    /// Only walk edges of these types
    pub edge_types: Option<Vec<String>>,
    /// Edge direction to honour
    pub direction: Direction,
}

/// Result of a traversal
#[derive(Debug, Clone, PartialEq)]
pub struct TraverseResult {
    /// Visited node ids, in BFS order
    pub nodes: Vec<String>,
    /// Edge ids walked
    pub edges: Vec<String>,
}

/// A labelled property graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, GraphEdge>,
    adjacency: BTreeMap<String, Adjacency>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        properties: Document,
    ) -> Result<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.nodes.insert(
            id.clone(),
            GraphNode {
                label: label.into(),
                properties,
            },
        );
        self.adjacency.entry(id).or_default();
        Ok(())
    }

    /// Add an edge; both endpoints must exist
    pub fn add_edge(
        &mut self,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        edge_type: impl Into<String>,
        properties: Document,
    ) -> Result<()> {
        let (id, from, to) = (id.into(), from.into(), to.into());
        if self.edges.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        for endpoint in [&from, &to] {
            if !self.nodes.contains_key(endpoint.as_str()) {
                return Err(Error::NotFound {
                    entity: "node",
                    name: endpoint.clone(),
                });
            }
        }
        self.adjacency
            .entry(from.clone())
            .or_default()
            .outgoing
            .insert(id.clone());
        self.adjacency
            .entry(to.clone())
            .or_default()
            .incoming
            .insert(id.clone());
        self.edges.insert(
            id,
            GraphEdge {
                from,
                to,
                edge_type: edge_type.into(),
                properties,
            },
        );
        Ok(())
    }

    /// Fetch a node
    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Fetch an edge
    pub fn get_edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.get(id)
    }

    /// Node ids
    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when the graph holds nothing
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Delete an edge; true when it existed
    pub fn delete_edge(&mut self, id: &str) -> bool {
        let Some(edge) = self.edges.remove(id) else {
            return false;
        };
        if let Some(adj) = self.adjacency.get_mut(&edge.from) {
            adj.outgoing.remove(id);
        }
        if let Some(adj) = self.adjacency.get_mut(&edge.to) {
            adj.incoming.remove(id);
        }
        true
    }

    /// Delete a node and every incident edge
    pub fn delete_node(&mut self, id: &str) -> Result<()> {
        if self.nodes.remove(id).is_none() {
            return Err(Error::NotFound {
                entity: "node",
                name: id.to_string(),
            });
        }
        let incident: Vec<String> = self
            .adjacency
            .remove(id)
            .map(|adj| adj.outgoing.into_iter().chain(adj.incoming).collect())
            .unwrap_or_default();
        for edge_id in incident {
            self.delete_edge(&edge_id);
        }
        Ok(())
    }

    /// Edges incident to `node` in `direction`, optionally filtered by
    /// type; yields `(edge id, neighbour node id)`
    fn incident(
        &self,
        node: &str,
        direction: Direction,
        edge_types: Option<&[String]>,
    ) -> Vec<(String, String)> {
        let Some(adj) = self.adjacency.get(node) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut push = |edge_id: &String, neighbour_of: fn(&GraphEdge) -> &String| {
            if let Some(edge) = self.edges.get(edge_id) {
                if edge_types.map_or(true, |types| types.contains(&edge.edge_type)) {
                    out.push((edge_id.clone(), neighbour_of(edge).clone()));
                }
            }
        };
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            for edge_id in &adj.outgoing {
                push(edge_id, |e| &e.to);
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            for edge_id in &adj.incoming {
                push(edge_id, |e| &e.from);
            }
        }
        out
    }

    /// Neighbouring node ids with the connecting edge ids
    pub fn neighbors(
        &self,
        node: &str,
        direction: Direction,
        edge_types: Option<&[String]>,
    ) -> Result<Vec<(String, String)>> {
        if !self.nodes.contains_key(node) {
            return Err(Error::NotFound {
                entity: "node",
                name: node.to_string(),
            });
        }
        Ok(self
            .incident(node, direction, edge_types)
            .into_iter()
            .map(|(edge, neighbour)| (neighbour, edge))
            .collect())
    }

    /// Breadth-first traversal from `start`
    pub fn traverse(&self, start: &str, options: &TraverseOptions) -> Result<TraverseResult> {
        if !self.nodes.contains_key(start) {
            return Err(Error::NotFound {
                entity: "node",
                name: start.to_string(),
            });
        }
        let mut visited = BTreeSet::new();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut queue = VecDeque::new();
        visited.insert(start.to_string());
        queue.push_back((start.to_string(), 0usize));
        while let Some((current, depth)) = queue.pop_front() {
            nodes.push(current.clone());
            if options.max_depth.map_or(false, |max| depth >= max) {
                continue;
            }
            for (edge_id, neighbour) in self.incident(
                &current,
                options.direction,
                options.edge_types.as_deref(),
            ) {
                if visited.insert(neighbour.clone()) {
                    edges.push(edge_id);
                    queue.push_back((neighbour, depth + 1));
                }
            }
        }
        Ok(TraverseResult { nodes, edges })
    }

    /// Shortest path from `from` to `to`
    ///
    /// Unweighted BFS by default; naming a `weight_property` switches to
    /// Dijkstra with that numeric edge property (missing or non-numeric
    /// weights count as 1). Returns the node path and its total cost.
    pub fn shortest_path(
        &self,
        from: &str,
        to: &str,
        weight_property: Option<&str>,
    ) -> Result<Option<(Vec<String>, f64)>> {
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(Error::NotFound {
                    entity: "node",
                    name: endpoint.to_string(),
                });
            }
        }
        match weight_property {
            None => Ok(self.bfs_path(from, to)),
            Some(prop) => Ok(self.dijkstra_path(from, to, prop)),
        }
    }

    fn bfs_path(&self, from: &str, to: &str) -> Option<(Vec<String>, f64)> {
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.to_string());
        parents.insert(from.to_string(), from.to_string());
        while let Some(current) = queue.pop_front() {
            if current == to {
                return Some(rebuild_path(&parents, from, to));
            }
            for (_, neighbour) in self.incident(&current, Direction::Outgoing, None) {
                if !parents.contains_key(&neighbour) {
                    parents.insert(neighbour.clone(), current.clone());
                    queue.push_back(neighbour);
                }
            }
        }
        None
    }

    fn edge_weight(edge: &GraphEdge, prop: &str) -> f64 {
        edge.properties
            .get(prop)
            .and_then(Value::as_f64)
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(1.0)
    }

    fn dijkstra_path(&self, from: &str, to: &str, prop: &str) -> Option<(Vec<String>, f64)> {
        #[derive(PartialEq)]
        struct QueueEntry {
            cost: f64,
            node: String,
        }
        impl Eq for QueueEntry {}
        impl Ord for QueueEntry {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reversed so the BinaryHeap pops the cheapest entry
                other
                    .cost
                    .partial_cmp(&self.cost)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| other.node.cmp(&self.node))
            }
        }
        impl PartialOrd for QueueEntry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist: HashMap<String, f64> = HashMap::new();
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(from.to_string(), 0.0);
        parents.insert(from.to_string(), from.to_string());
        heap.push(QueueEntry {
            cost: 0.0,
            node: from.to_string(),
        });
        while let Some(QueueEntry { cost, node }) = heap.pop() {
            if node == to {
                let (path, _) = rebuild_path(&parents, from, to);
                return Some((path, cost));
            }
            if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for (edge_id, neighbour) in self.incident(&node, Direction::Outgoing, None) {
                let weight = self
                    .edges
                    .get(&edge_id)
                    .map(|e| Self::edge_weight(e, prop))
                    .unwrap_or(1.0);
                let next = cost + weight;
                if next < dist.get(&neighbour).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(neighbour.clone(), next);
                    parents.insert(neighbour.clone(), node.clone());
                    heap.push(QueueEntry {
                        cost: next,
                        node: neighbour,
                    });
                }
            }
        }
        None
    }

    /// Eigenvector centrality by damped power iteration
    ///
    /// Scores are normalised to sum to 1. With `damping` d, each step is
    /// `score = (1 - d)/n + d * Σ incoming-neighbour score / out-degree`
    /// (dangling nodes spread uniformly).
    pub fn centrality(&self, iterations: usize, damping: f64) -> HashMap<String, f64> {
        let n = self.nodes.len();
        if n == 0 {
            return HashMap::new();
        }
        let uniform = 1.0 / n as f64;
        let mut scores: HashMap<String, f64> =
            self.nodes.keys().map(|id| (id.clone(), uniform)).collect();
        for _ in 0..iterations {
            let mut next: HashMap<String, f64> = self
                .nodes
                .keys()
                .map(|id| (id.clone(), (1.0 - damping) * uniform))
                .collect();
            let mut dangling = 0.0;
            for (id, _) in &self.nodes {
                let score = scores[id];
                let out: Vec<&String> = self
                    .adjacency
                    .get(id)
                    .map(|adj| adj.outgoing.iter().collect())
                    .unwrap_or_default();
                if out.is_empty() {
                    dangling += score;
                    continue;
                }
                let share = damping * score / out.len() as f64;
                for edge_id in out {
                    if let Some(edge) = self.edges.get(edge_id) {
                        *next.entry(edge.to.clone()).or_insert(0.0) += share;
                    }
                }
            }
            let dangling_share = damping * dangling * uniform;
            for value in next.values_mut() {
                *value += dangling_share;
            }
            scores = next;
        }
        scores
    }
}

fn rebuild_path(parents: &HashMap<String, String>, from: &str, to: &str) -> (Vec<String>, f64) {
    let mut path = vec![to.to_string()];
    let mut current = to.to_string();
    while current != from {
        current = parents[&current].clone();
        path.push(current.clone());
    }
    path.reverse();
    let hops = (path.len().saturating_sub(1)) as f64;
    (path, hops)
}
