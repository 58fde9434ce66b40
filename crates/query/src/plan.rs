//! Cost-based query planning
//!
//! The planner enumerates candidate plans (a full-scan baseline plus one
//! index-lookup alternative per usable index), scores each as the sum of
//! step costs discounted by the selectivity of everything before the
//! step, and picks the minimum. Ties prefer a unique-index equality
//! lookup, then the plan with fewer steps.

use monarch_core::{Document, Value};
use tracing::debug;

/// What a plan step does
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Walk every record in the collection
    FullScan,
    /// Materialise candidate ids from a secondary index
    IndexLookup {
        /// Index name
        index: String,
        /// Fields consumed from the query by the lookup
        fields: Vec<String>,
    },
    /// Apply residual predicates
    Filter,
    /// Order the result set
    Sort,
    /// Truncate the result set
    Limit,
    /// Drop a leading prefix of the result set
    Skip,
    /// Shape output fields
    Projection,
    /// One aggregation pipeline stage
    Aggregation {
        /// Stage operator name (`$group`, `$unwind`, ...)
        stage: String,
    },
}

/// One step of a query plan, with its cost model inputs
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// What the step does
    pub kind: StepKind,
    /// Estimated cost of running the step over its input
    pub cost: f64,
    /// Estimated fraction of records surviving the step, in [0, 1]
    pub selectivity: f64,
}

impl PlanStep {
    fn new(kind: StepKind, cost: f64, selectivity: f64) -> Self {
        Self {
            kind,
            cost,
            selectivity,
        }
    }
}

/// A scored, executable plan
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Ordered steps
    pub steps: Vec<PlanStep>,
    /// True when the first step is an equality lookup on a unique index
    pub unique_equality: bool,
}

impl QueryPlan {
    /// Σ step.cost × Π preceding selectivities
    pub fn score(&self) -> f64 {
        let mut total = 0.0;
        let mut carried = 1.0;
        for step in &self.steps {
            total += step.cost * carried;
            carried *= step.selectivity;
        }
        total
    }

    /// The index chosen by this plan, if any
    pub fn chosen_index(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| match &s.kind {
            StepKind::IndexLookup { index, .. } => Some(index.as_str()),
            _ => None,
        })
    }
}

/// What the planner needs to know about an available index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Index name
    pub name: String,
    /// Indexed field paths, in order
    pub fields: Vec<String>,
    /// No key maps to more than one id
    pub unique: bool,
    /// Number of distinct keys currently in the index
    pub key_count: usize,
}

/// True when the condition on a field is an equality or `$in` the index
/// can answer exactly
fn is_equality_condition(condition: &Value) -> bool {
    match condition {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map
            .iter()
            .all(|(op, _)| matches!(op.as_str(), "$eq" | "$in")),
        // A literal is an equality
        _ => true,
    }
}

/// True when the condition is a range the index keyspace can be scanned for
fn is_range_condition(condition: &Value) -> bool {
    match condition {
        Value::Object(map) => map
            .keys()
            .any(|k| matches!(k.as_str(), "$gt" | "$gte" | "$lt" | "$lte")),
        _ => false,
    }
}

/// Estimated fraction of records a query keeps, by predicate shape
fn estimate_selectivity(query: &Document) -> f64 {
    if query.is_empty() {
        return 1.0;
    }
    let mut selectivity: f64 = 1.0;
    for (field, condition) in query.iter() {
        if field.starts_with('$') {
            selectivity *= 0.5;
        } else if is_equality_condition(condition) {
            selectivity *= 0.1;
        } else if is_range_condition(condition) {
            selectivity *= 0.3;
        } else {
            selectivity *= 0.5;
        }
    }
    selectivity.max(0.001)
}

/// Plan a query over `record_count` records with `indexes` available
///
/// The returned plan always ends with a `Filter` step: execution applies
/// the full query as a residual predicate, so index selection is purely a
/// candidate-narrowing concern and never affects correctness.
pub fn plan(record_count: usize, query: &Document, indexes: &[IndexInfo]) -> QueryPlan {
    let n = record_count.max(1) as f64;
    let query_selectivity = estimate_selectivity(query);

    let mut candidates = Vec::new();

    // Baseline: full scan then filter.
    candidates.push(QueryPlan {
        steps: vec![
            PlanStep::new(StepKind::FullScan, n, 1.0),
            PlanStep::new(StepKind::Filter, n, query_selectivity),
        ],
        unique_equality: false,
    });

    for index in indexes {
        // A compound index applies only when every indexed field carries an
        // equality predicate; a single-field index may also serve ranges by
        // scanning its ordered keyspace.
        let all_equality = index
            .fields
            .iter()
            .all(|f| query.get(f).map_or(false, is_equality_condition));
        let single_range = index.fields.len() == 1
            && query
                .get(&index.fields[0])
                .map_or(false, is_range_condition);
        if !all_equality && !single_range {
            continue;
        }

        let unique_equality = index.unique && all_equality;
        let keys = index.key_count.max(1) as f64;
        let (lookup_cost, lookup_selectivity) = if all_equality {
            if index.unique {
                (1.0, 1.0 / n)
            } else {
                (keys.log2().max(1.0), (1.0 / keys).min(1.0))
            }
        } else {
            // Range: walks the ordered keyspace, decoding and comparing
            // every composite key. Priced at twice a record scan per key so
            // ranges over wide domains lose to the full-scan baseline.
            (keys * 2.0, 0.3)
        };

        candidates.push(QueryPlan {
            steps: vec![
                PlanStep::new(
                    StepKind::IndexLookup {
                        index: index.name.clone(),
                        fields: index.fields.clone(),
                    },
                    lookup_cost,
                    lookup_selectivity,
                ),
                PlanStep::new(StepKind::Filter, n * lookup_selectivity, 1.0),
            ],
            unique_equality,
        });
    }

    let best = candidates
        .into_iter()
        .min_by(|a, b| {
            a.score()
                .partial_cmp(&b.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.unique_equality.cmp(&a.unique_equality))
                .then_with(|| a.steps.len().cmp(&b.steps.len()))
        })
        .expect("candidate set always contains the full-scan baseline");

    debug!(
        score = best.score(),
        index = best.chosen_index().unwrap_or("<full scan>"),
        "selected query plan"
    );
    best
}
