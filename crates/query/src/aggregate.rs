//! Aggregation pipeline
//!
//! Stages execute in order over an owned vector of documents: `$match`,
//! `$group`, `$sort`, `$limit`, `$skip`, `$project`, `$unwind`,
//! `$addFields`, `$replaceRoot`. Expressions use the `$expr` evaluator;
//! strings beginning with `$` are field references.
//!
//! Sort specifications accept two shapes: an object (`{"a": 1, "b": -1}`,
//! priority in key order) or an array of single-key objects
//! (`[{"b": -1}, {"a": 1}]`) when the priority must differ from the key
//! order.

use crate::expr::eval_expr;
use crate::matcher::matches;
use monarch_core::{cmp_values, set_path, values_equal, Document, Error, Result, Value};
use std::collections::HashMap;

/// Run `pipeline` over `docs`
pub fn run_pipeline(docs: Vec<Document>, pipeline: &[Value]) -> Result<Vec<Document>> {
    let mut current = docs;
    for stage in pipeline {
        let stage_doc = stage
            .as_object()
            .filter(|d| d.len() == 1)
            .ok_or_else(|| {
                Error::InvalidArgument("pipeline stage must be a single-operator object".into())
            })?;
        let (op, spec) = stage_doc.iter().next().unwrap();
        current = match op.as_str() {
            "$match" => apply_match(current, spec)?,
            "$group" => apply_group(current, spec)?,
            "$sort" => {
                let keys = parse_sort_spec(spec)?;
                sort_documents(&mut current, &keys);
                current
            }
            "$limit" => {
                let n = positive_int(spec, "$limit")?;
                current.truncate(n);
                current
            }
            "$skip" => {
                let n = positive_int(spec, "$skip")?;
                if n >= current.len() {
                    Vec::new()
                } else {
                    current.split_off(n)
                }
            }
            "$project" => apply_project(current, spec)?,
            "$unwind" => apply_unwind(current, spec)?,
            "$addFields" => apply_add_fields(current, spec)?,
            "$replaceRoot" => apply_replace_root(current, spec)?,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown pipeline stage: {other}"
                )))
            }
        };
    }
    Ok(current)
}

fn positive_int(spec: &Value, stage: &str) -> Result<usize> {
    spec.as_i64()
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| Error::InvalidArgument(format!("{stage} takes a non-negative integer")))
}

// ============================================================================
// Sorting
// ============================================================================

/// Parse a sort specification into `(path, direction)` pairs
pub fn parse_sort_spec(spec: &Value) -> Result<Vec<(String, i32)>> {
    let mut keys = Vec::new();
    let mut push = |field: &str, dir: &Value| -> Result<()> {
        match dir.as_i64() {
            Some(1) => keys.push((field.to_string(), 1)),
            Some(-1) => keys.push((field.to_string(), -1)),
            _ => {
                return Err(Error::InvalidField {
                    field: field.to_string(),
                    message: "sort direction must be 1 or -1".into(),
                })
            }
        }
        Ok(())
    };
    match spec {
        Value::Object(map) => {
            for (field, dir) in map.iter() {
                push(field, dir)?;
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let map = entry.as_object().ok_or_else(|| {
                    Error::InvalidArgument("sort array entries must be objects".into())
                })?;
                for (field, dir) in map.iter() {
                    push(field, dir)?;
                }
            }
        }
        _ => return Err(Error::InvalidArgument("sort spec must be an object".into())),
    }
    Ok(keys)
}

/// Stable multi-key sort by `cmp_values`; missing fields sort as `Null`
pub fn sort_documents(docs: &mut [Document], keys: &[(String, i32)]) {
    docs.sort_by(|a, b| {
        for (path, dir) in keys {
            let va = a.get_path(path).unwrap_or(&Value::Null);
            let vb = b.get_path(path).unwrap_or(&Value::Null);
            let ord = cmp_values(va, vb);
            if ord != std::cmp::Ordering::Equal {
                return if *dir < 0 { ord.reverse() } else { ord };
            }
        }
        std::cmp::Ordering::Equal
    });
}

// ============================================================================
// Stages
// ============================================================================

fn apply_match(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let query = spec
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$match takes a query object".into()))?;
    Ok(docs.into_iter().filter(|d| matches(d, query)).collect())
}

/// Group accumulator state
enum Acc {
    Sum { int: i64, float: f64, all_int: bool },
    Count(usize),
    Avg { sum: f64, count: usize },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
    AddToSet(Vec<Value>),
}

impl Acc {
    fn new(op: &str) -> Option<Acc> {
        Some(match op {
            "$sum" => Acc::Sum {
                int: 0,
                float: 0.0,
                all_int: true,
            },
            "$count" => Acc::Count(0),
            "$avg" => Acc::Avg { sum: 0.0, count: 0 },
            "$min" => Acc::Min(None),
            "$max" => Acc::Max(None),
            "$first" => Acc::First(None),
            "$last" => Acc::Last(None),
            "$push" => Acc::Push(Vec::new()),
            "$addToSet" => Acc::AddToSet(Vec::new()),
            _ => return None,
        })
    }

    fn feed(&mut self, value: Value) {
        match self {
            Acc::Sum {
                int,
                float,
                all_int,
            } => match value {
                Value::Int(i) => {
                    *int = int.wrapping_add(i);
                    *float += i as f64;
                }
                Value::Float(f) => {
                    *all_int = false;
                    *float += f;
                }
                _ => {}
            },
            Acc::Count(n) => *n += 1,
            Acc::Avg { sum, count } => {
                if let Some(f) = value.as_f64() {
                    *sum += f;
                    *count += 1;
                }
            }
            Acc::Min(best) => {
                if value != Value::Null {
                    let keep = best
                        .as_ref()
                        .map_or(true, |b| cmp_values(&value, b) == std::cmp::Ordering::Less);
                    if keep {
                        *best = Some(value);
                    }
                }
            }
            Acc::Max(best) => {
                if value != Value::Null {
                    let keep = best
                        .as_ref()
                        .map_or(true, |b| cmp_values(&value, b) == std::cmp::Ordering::Greater);
                    if keep {
                        *best = Some(value);
                    }
                }
            }
            Acc::First(slot) => {
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
            Acc::Last(slot) => *slot = Some(value),
            Acc::Push(items) => items.push(value),
            Acc::AddToSet(items) => {
                if !items.iter().any(|i| values_equal(i, &value)) {
                    items.push(value);
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Acc::Sum {
                int,
                float,
                all_int,
            } => {
                if all_int {
                    Value::Int(int)
                } else {
                    Value::Float(float)
                }
            }
            Acc::Count(n) => Value::Int(n as i64),
            Acc::Avg { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(sum / count as f64)
                }
            }
            Acc::Min(v) | Acc::Max(v) | Acc::First(v) | Acc::Last(v) => v.unwrap_or(Value::Null),
            Acc::Push(items) | Acc::AddToSet(items) => Value::Array(items),
        }
    }
}

fn apply_group(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$group takes an object".into()))?;
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| Error::InvalidArgument("$group requires _id".into()))?;

    // (field, op, operand) triples for every accumulator
    let mut accumulators = Vec::new();
    for (field, acc_spec) in spec.iter() {
        if field == "_id" {
            continue;
        }
        let acc_map = acc_spec
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| Error::InvalidField {
                field: field.clone(),
                message: "accumulator must be a single-operator object".into(),
            })?;
        let (op, operand) = acc_map.iter().next().unwrap();
        if Acc::new(op).is_none() {
            return Err(Error::InvalidField {
                field: field.clone(),
                message: format!("unknown accumulator: {op}"),
            });
        }
        accumulators.push((field.clone(), op.clone(), operand.clone()));
    }

    // Encounter-ordered groups keyed by the canonical JSON of the _id value
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Value, Vec<Acc>)> = HashMap::new();

    for doc in &docs {
        let key_value = eval_expr(doc, id_expr);
        let key = serde_json::to_string(&key_value)?;
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            let states = accumulators
                .iter()
                .map(|(_, op, _)| Acc::new(op).expect("accumulator validated above"))
                .collect();
            (key_value, states)
        });
        for (state, (_, _, operand)) in entry.1.iter_mut().zip(accumulators.iter()) {
            state.feed(eval_expr(doc, operand));
        }
    }

    let mut result = Vec::with_capacity(order.len());
    for key in order {
        let (id_value, states) = groups.remove(&key).expect("group recorded in order");
        let mut out = Document::new();
        out.set("_id", id_value);
        for ((field, _, _), state) in accumulators.iter().zip(states) {
            out.set(field.clone(), state.finish());
        }
        result.push(out);
    }
    Ok(result)
}

/// Shape one document through a projection specification
///
/// Any explicit include (`1`/`true`, other than on `_id`) switches the
/// projection into include mode; otherwise fields are excluded from a
/// copy. Values that are neither include nor exclude markers are
/// evaluated as expressions. `find`'s projection argument and the
/// `$project` stage share these semantics.
pub fn project_document(doc: &Document, spec: &Document) -> Document {
    let include_mode = spec.iter().any(|(field, v)| {
        field != "_id" && matches!(v, Value::Int(1) | Value::Bool(true))
    });
    let id_excluded = matches!(spec.get("_id"), Some(Value::Int(0)) | Some(Value::Bool(false)));

    let mut out = if include_mode {
        Document::new()
    } else {
        doc.clone()
    };
    for (field, rule) in spec.iter() {
        match rule {
            Value::Int(1) | Value::Bool(true) => {
                if let Some(v) = doc.get_path(field) {
                    set_path(&mut out, field, v.clone());
                }
            }
            Value::Int(0) | Value::Bool(false) => {
                monarch_core::remove_path(&mut out, field);
            }
            expr => {
                set_path(&mut out, field, eval_expr(doc, expr));
            }
        }
    }
    if include_mode && !id_excluded {
        if let Some(id) = doc.get("_id") {
            out.set("_id", id.clone());
        }
    }
    out
}

fn apply_project(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$project takes an object".into()))?;
    Ok(docs.iter().map(|doc| project_document(doc, spec)).collect())
}

fn apply_unwind(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let (path, preserve) = match spec {
        Value::Str(p) => (p.as_str(), false),
        Value::Object(map) => {
            let p = map
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::InvalidArgument("$unwind requires a path".into()))?;
            let preserve = matches!(
                map.get("preserveNullAndEmptyArrays"),
                Some(Value::Bool(true))
            );
            (p, preserve)
        }
        _ => return Err(Error::InvalidArgument("$unwind takes a path".into())),
    };
    let path = path.strip_prefix('$').ok_or_else(|| {
        Error::InvalidArgument("$unwind path must start with '$'".into())
    })?;

    let mut result = Vec::new();
    for doc in docs {
        // A non-array value unwinds to itself
        let items: Option<Vec<Value>> = match doc.get_path(path) {
            Some(Value::Array(items)) => Some(items.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(vec![other.clone()]),
        };
        match items {
            Some(items) if !items.is_empty() => {
                for item in items {
                    let mut unwound = doc.clone();
                    set_path(&mut unwound, path, item);
                    result.push(unwound);
                }
            }
            _ => {
                if preserve {
                    result.push(doc);
                }
            }
        }
    }
    Ok(result)
}

fn apply_add_fields(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("$addFields takes an object".into()))?;
    Ok(docs
        .into_iter()
        .map(|doc| {
            let mut out = doc.clone();
            for (field, expr) in spec.iter() {
                set_path(&mut out, field, eval_expr(&doc, expr));
            }
            out
        })
        .collect())
}

fn apply_replace_root(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let new_root = spec
        .as_object()
        .and_then(|m| m.get("newRoot"))
        .ok_or_else(|| Error::InvalidArgument("$replaceRoot requires newRoot".into()))?;
    Ok(docs
        .into_iter()
        .filter_map(|doc| match eval_expr(&doc, new_root) {
            Value::Object(d) => Some(d),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(json: &[&str]) -> Vec<Document> {
        json.iter().map(|j| Document::from_json_str(j).unwrap()).collect()
    }

    fn stages(json: &str) -> Vec<Value> {
        serde_json::from_str::<Value>(json)
            .unwrap()
            .as_array()
            .unwrap()
            .to_vec()
    }

    fn salaries() -> Vec<Document> {
        docs(&[
            r#"{"_id": "1", "dept": "E", "salary": 50}"#,
            r#"{"_id": "2", "dept": "E", "salary": 70}"#,
            r#"{"_id": "3", "dept": "S", "salary": 40}"#,
        ])
    }

    // === $match / $limit / $skip ===

    #[test]
    fn test_match_stage() {
        let out = run_pipeline(salaries(), &stages(r#"[{"$match": {"dept": "E"}}]"#)).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_limit_and_skip() {
        let out = run_pipeline(salaries(), &stages(r#"[{"$skip": 1}, {"$limit": 1}]"#)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), Some("2"));
    }

    #[test]
    fn test_skip_past_end() {
        let out = run_pipeline(salaries(), &stages(r#"[{"$skip": 99}]"#)).unwrap();
        assert!(out.is_empty());
    }

    // === $group ===

    #[test]
    fn test_group_avg_and_sort() {
        let out = run_pipeline(
            salaries(),
            &stages(
                r#"[
                    {"$match": {}},
                    {"$group": {"_id": "$dept", "avg": {"$avg": "$salary"}}},
                    {"$sort": {"avg": -1}}
                ]"#,
            ),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("_id"), Some(&Value::Str("E".into())));
        assert_eq!(out[0].get("avg"), Some(&Value::Float(60.0)));
        assert_eq!(out[1].get("_id"), Some(&Value::Str("S".into())));
        assert_eq!(out[1].get("avg"), Some(&Value::Float(40.0)));
    }

    #[test]
    fn test_group_sum_count_min_max() {
        let out = run_pipeline(
            salaries(),
            &stages(
                r#"[{"$group": {
                    "_id": null,
                    "total": {"$sum": "$salary"},
                    "n": {"$count": {}},
                    "lo": {"$min": "$salary"},
                    "hi": {"$max": "$salary"}
                }}]"#,
            ),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("total"), Some(&Value::Int(160)));
        assert_eq!(out[0].get("n"), Some(&Value::Int(3)));
        assert_eq!(out[0].get("lo"), Some(&Value::Int(40)));
        assert_eq!(out[0].get("hi"), Some(&Value::Int(70)));
    }

    #[test]
    fn test_group_first_last_push_add_to_set() {
        let out = run_pipeline(
            docs(&[
                r#"{"g": 1, "v": "a"}"#,
                r#"{"g": 1, "v": "b"}"#,
                r#"{"g": 1, "v": "a"}"#,
            ]),
            &stages(
                r#"[{"$group": {
                    "_id": "$g",
                    "first": {"$first": "$v"},
                    "last": {"$last": "$v"},
                    "all": {"$push": "$v"},
                    "distinct": {"$addToSet": "$v"}
                }}]"#,
            ),
        )
        .unwrap();
        assert_eq!(out[0].get("first"), Some(&Value::Str("a".into())));
        assert_eq!(out[0].get("last"), Some(&Value::Str("a".into())));
        assert_eq!(
            out[0].get("all").unwrap().as_array().unwrap().len(),
            3
        );
        assert_eq!(
            out[0].get("distinct").unwrap().as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn test_group_preserves_encounter_order() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$group": {"_id": "$dept", "n": {"$count": {}}}}]"#),
        )
        .unwrap();
        assert_eq!(out[0].get("_id"), Some(&Value::Str("E".into())));
        assert_eq!(out[1].get("_id"), Some(&Value::Str("S".into())));
    }

    #[test]
    fn test_group_unknown_accumulator_errors() {
        let err = run_pipeline(
            salaries(),
            &stages(r#"[{"$group": {"_id": null, "x": {"$median": "$salary"}}}]"#),
        )
        .unwrap_err();
        assert_eq!(err.kind(), monarch_core::ErrorKind::Validation);
    }

    // === $sort ===

    #[test]
    fn test_sort_is_stable() {
        let input = docs(&[
            r#"{"_id": "a", "k": 1}"#,
            r#"{"_id": "b", "k": 1}"#,
            r#"{"_id": "c", "k": 0}"#,
        ]);
        let out = run_pipeline(input, &stages(r#"[{"$sort": {"k": 1}}]"#)).unwrap();
        assert_eq!(out[0].id(), Some("c"));
        assert_eq!(out[1].id(), Some("a"));
        assert_eq!(out[2].id(), Some("b"));
    }

    #[test]
    fn test_sort_array_spec_orders_priorities() {
        let input = docs(&[
            r#"{"a": 1, "b": 2}"#,
            r#"{"a": 2, "b": 1}"#,
        ]);
        // Priority on "b" first even though "a" sorts earlier alphabetically
        let out = run_pipeline(input, &stages(r#"[{"$sort": [{"b": 1}, {"a": 1}]}]"#)).unwrap();
        assert_eq!(out[0].get("b"), Some(&Value::Int(1)));
    }

    // === $project ===

    #[test]
    fn test_project_include_mode() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$project": {"dept": 1}}]"#),
        )
        .unwrap();
        assert!(out[0].contains("dept"));
        assert!(out[0].contains("_id"));
        assert!(!out[0].contains("salary"));
    }

    #[test]
    fn test_project_exclude_mode() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$project": {"salary": 0}}]"#),
        )
        .unwrap();
        assert!(out[0].contains("dept"));
        assert!(!out[0].contains("salary"));
    }

    #[test]
    fn test_project_computed_field() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$project": {"double": {"$multiply": ["$salary", 2]}}}]"#),
        )
        .unwrap();
        assert_eq!(out[0].get("double"), Some(&Value::Int(100)));
    }

    #[test]
    fn test_project_id_exclusion() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$project": {"dept": 1, "_id": 0}}]"#),
        )
        .unwrap();
        assert!(!out[0].contains("_id"));
    }

    // === $unwind ===

    #[test]
    fn test_unwind() {
        let input = docs(&[r#"{"_id": "a", "tags": ["x", "y"]}"#]);
        let out = run_pipeline(input, &stages(r#"[{"$unwind": "$tags"}]"#)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("tags"), Some(&Value::Str("x".into())));
        assert_eq!(out[1].get("tags"), Some(&Value::Str("y".into())));
    }

    #[test]
    fn test_unwind_drops_missing_and_empty() {
        let input = docs(&[
            r#"{"_id": "a", "tags": []}"#,
            r#"{"_id": "b"}"#,
            r#"{"_id": "c", "tags": ["z"]}"#,
        ]);
        let out = run_pipeline(input, &stages(r#"[{"$unwind": "$tags"}]"#)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), Some("c"));
    }

    #[test]
    fn test_unwind_preserve_flag() {
        let input = docs(&[r#"{"_id": "a", "tags": []}"#, r#"{"_id": "b"}"#]);
        let out = run_pipeline(
            input,
            &stages(
                r#"[{"$unwind": {"path": "$tags", "preserveNullAndEmptyArrays": true}}]"#,
            ),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
    }

    // === $addFields / $replaceRoot ===

    #[test]
    fn test_add_fields() {
        let out = run_pipeline(
            salaries(),
            &stages(r#"[{"$addFields": {"bonus": {"$divide": ["$salary", 10]}}}]"#),
        )
        .unwrap();
        assert_eq!(out[0].get("bonus"), Some(&Value::Float(5.0)));
        assert!(out[0].contains("salary"));
    }

    #[test]
    fn test_replace_root() {
        let input = docs(&[r#"{"_id": "a", "inner": {"x": 1}}"#, r#"{"_id": "b"}"#]);
        let out = run_pipeline(input, &stages(r#"[{"$replaceRoot": {"newRoot": "$inner"}}]"#))
            .unwrap();
        // The doc without "inner" evaluates to Null and is dropped
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("x"), Some(&Value::Int(1)));
    }

    // === Errors ===

    #[test]
    fn test_unknown_stage_errors() {
        let err = run_pipeline(salaries(), &stages(r#"[{"$facet": {}}]"#)).unwrap_err();
        assert_eq!(err.kind(), monarch_core::ErrorKind::Validation);
    }
}
