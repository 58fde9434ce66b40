//! Query matcher
//!
//! Evaluates a query document against a record. A query maps field paths
//! to conditions; a condition is either a literal (structural equality,
//! deep for arrays and objects) or an object whose keys are `$`-operators.
//!
//! Type mismatches never error: they simply fail to match. Unknown
//! operators match nothing and are reported once per evaluation via
//! `tracing::warn!`.

use crate::expr::{eval_expr, is_truthy};
use monarch_core::{cmp_values, values_equal, Document, Value};
use std::cmp::Ordering;
use tracing::warn;

/// Evaluate `query` against `doc`
///
/// An empty query matches every record.
pub fn matches(doc: &Document, query: &Document) -> bool {
    query.iter().all(|(key, condition)| match key.as_str() {
        "$and" => match condition.as_array() {
            Some(clauses) => clauses.iter().all(|c| match c.as_object() {
                Some(q) => matches(doc, q),
                None => false,
            }),
            None => false,
        },
        "$or" => match condition.as_array() {
            Some(clauses) => clauses.iter().any(|c| match c.as_object() {
                Some(q) => matches(doc, q),
                None => false,
            }),
            None => false,
        },
        "$nor" => match condition.as_array() {
            Some(clauses) => !clauses.iter().any(|c| match c.as_object() {
                Some(q) => matches(doc, q),
                None => false,
            }),
            None => false,
        },
        "$expr" => is_truthy(&eval_expr(doc, condition)),
        _ => field_matches(doc.get_path(key), condition),
    })
}

/// True when every key of `condition` is a `$`-operator
fn is_operator_map(condition: &Document) -> bool {
    !condition.is_empty() && condition.keys().all(|k| k.starts_with('$'))
}

fn field_matches(field: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Object(cond) if is_operator_map(cond) => cond
            .iter()
            .all(|(op, operand)| apply_operator(field, op, operand)),
        literal => literal_matches(field, literal),
    }
}

/// Literal equality; a `Null` literal also matches a missing field
fn literal_matches(field: Option<&Value>, literal: &Value) -> bool {
    match field {
        Some(value) => values_equal(value, literal),
        None => matches!(literal, Value::Null),
    }
}

/// Ordered comparison, defined only within one comparable kind
fn compare(field: &Value, operand: &Value) -> Option<Ordering> {
    let comparable = match (field, operand) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => true,
        (Value::Str(_), Value::Str(_)) => true,
        (Value::Timestamp(_), Value::Timestamp(_)) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Array(_), Value::Array(_)) => true,
        _ => false,
    };
    comparable.then(|| cmp_values(field, operand))
}

fn in_operand(field: &Value, operand: &Value) -> bool {
    match operand.as_array() {
        Some(candidates) => {
            if candidates.iter().any(|c| values_equal(field, c)) {
                return true;
            }
            // An array field matches when any of its members is listed
            match field.as_array() {
                Some(members) => members
                    .iter()
                    .any(|m| candidates.iter().any(|c| values_equal(m, c))),
                None => false,
            }
        }
        None => false,
    }
}

fn apply_operator(field: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => literal_matches(field, operand),
        "$ne" => !literal_matches(field, operand),
        "$gt" => field
            .and_then(|f| compare(f, operand))
            .map_or(false, |ord| ord == Ordering::Greater),
        "$gte" => field
            .and_then(|f| compare(f, operand))
            .map_or(false, |ord| ord != Ordering::Less),
        "$lt" => field
            .and_then(|f| compare(f, operand))
            .map_or(false, |ord| ord == Ordering::Less),
        "$lte" => field
            .and_then(|f| compare(f, operand))
            .map_or(false, |ord| ord != Ordering::Greater),
        "$in" => field.map_or(false, |f| in_operand(f, operand)),
        "$nin" => !field.map_or(false, |f| in_operand(f, operand)),
        "$exists" => {
            let wanted = match operand {
                Value::Bool(b) => *b,
                _ => is_truthy(operand),
            };
            field.is_some() == wanted
        }
        "$type" => match (field, operand.as_str()) {
            (Some(f), Some(name)) => {
                name == f.type_name() || (name == "number" && f.is_number())
            }
            _ => false,
        },
        "$regex" => match (field.and_then(|f| f.as_str()), operand.as_str()) {
            (Some(text), Some(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => re.is_match(text),
                Err(_) => {
                    warn!(pattern, "invalid $regex pattern");
                    false
                }
            },
            _ => false,
        },
        "$size" => match (field.and_then(|f| f.as_array()), operand.as_i64()) {
            (Some(items), Some(n)) => n >= 0 && items.len() as i64 == n,
            _ => false,
        },
        "$all" => match (field.and_then(|f| f.as_array()), operand.as_array()) {
            (Some(items), Some(wanted)) => wanted
                .iter()
                .all(|w| items.iter().any(|i| values_equal(i, w))),
            _ => false,
        },
        "$elemMatch" => match (field.and_then(|f| f.as_array()), operand.as_object()) {
            (Some(items), Some(sub)) => items.iter().any(|item| match item {
                Value::Object(element) if !is_operator_map(sub) => matches(element, sub),
                element => {
                    // Operator map applied to a scalar element
                    is_operator_map(sub)
                        && sub
                            .iter()
                            .all(|(op, operand)| apply_operator(Some(element), op, operand))
                }
            }),
            _ => false,
        },
        "$not" => match operand {
            Value::Object(inner) if is_operator_map(inner) => !inner
                .iter()
                .all(|(op, operand)| apply_operator(field, op, operand)),
            _ => !field_matches(field, operand),
        },
        "$mod" => match (field.and_then(|f| f.as_i64()), operand.as_array()) {
            (Some(value), Some(args)) if args.len() == 2 => {
                match (args[0].as_i64(), args[1].as_i64()) {
                    (Some(divisor), Some(remainder)) if divisor != 0 => {
                        value % divisor == remainder
                    }
                    _ => false,
                }
            }
            _ => false,
        },
        "$bitsAllSet" => bits(field, operand).map_or(false, |(v, m)| v & m == m),
        "$bitsAllClear" => bits(field, operand).map_or(false, |(v, m)| v & m == 0),
        "$bitsAnySet" => bits(field, operand).map_or(false, |(v, m)| v & m != 0),
        "$bitsAnyClear" => bits(field, operand).map_or(false, |(v, m)| v & m != m),
        "$text" => match (field.and_then(|f| f.as_str()), operand.as_str()) {
            (Some(text), Some(query)) => {
                let tokens = monarch_search::tokenize(text);
                let wanted = monarch_search::tokenize_unique(query);
                !wanted.is_empty() && wanted.iter().all(|w| tokens.contains(w))
            }
            _ => false,
        },
        unknown => {
            warn!(operator = unknown, "unknown query operator");
            false
        }
    }
}

fn bits(field: Option<&Value>, operand: &Value) -> Option<(i64, i64)> {
    Some((field?.as_i64()?, operand.as_i64()?))
}
