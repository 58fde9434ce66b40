//! Query surface for Monarch
//!
//! Four pieces sit in this crate, all pure over `monarch_core` values:
//! - `matcher`: evaluate a query document against a record
//! - `expr`: the `$expr` arithmetic/comparison language
//! - `plan`: cost-based plan enumeration and index selection
//! - `aggregate`: the aggregation pipeline

pub mod aggregate;
pub mod expr;
pub mod matcher;
pub mod plan;

pub use aggregate::{parse_sort_spec, project_document, run_pipeline, sort_documents};
pub use expr::{eval_expr, is_truthy};
pub use matcher::matches;
pub use plan::{plan, IndexInfo, PlanStep, QueryPlan, StepKind};
