//! `$expr` expression evaluation
//!
//! A small arithmetic/comparison expression language shared by the
//! matcher's `$expr` operator and the aggregation pipeline's computed
//! fields. Strings beginning with `$` are field references; objects with
//! a single `$`-operator key are applications; everything else is a
//! literal.
//!
//! Supported operators: `$eq $ne $gt $gte $lt $lte $add $subtract
//! $multiply $divide $mod $cond`.

use monarch_core::{cmp_values, values_equal, Document, Value};
use std::cmp::Ordering;
use tracing::warn;

/// Truthiness for `$expr` and `$cond`: null, false, 0 and 0.0 are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        _ => true,
    }
}

/// Evaluate `expr` against `doc`
///
/// Never errors: an unresolvable reference or a type mismatch evaluates
/// to `Null`.
pub fn eval_expr(doc: &Document, expr: &Value) -> Value {
    match expr {
        Value::Str(s) if s.starts_with('$') => doc
            .get_path(&s[1..])
            .cloned()
            .unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.iter().map(|e| eval_expr(doc, e)).collect()),
        Value::Object(map) if map.len() == 1 => {
            let (op, operand) = map.iter().next().unwrap();
            if op.starts_with('$') {
                apply(doc, op, operand)
            } else {
                expr.clone()
            }
        }
        other => other.clone(),
    }
}

fn binary_args(doc: &Document, operand: &Value) -> Option<(Value, Value)> {
    let args = operand.as_array()?;
    if args.len() != 2 {
        return None;
    }
    Some((eval_expr(doc, &args[0]), eval_expr(doc, &args[1])))
}

fn comparison(doc: &Document, operand: &Value, pred: fn(Ordering) -> bool) -> Value {
    match binary_args(doc, operand) {
        Some((a, b)) => Value::Bool(pred(cmp_values(&a, &b))),
        None => Value::Null,
    }
}

/// Numeric addition preserving `Int` when both sides are integers
fn arith(a: &Value, b: &Value, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match int_op(*x, *y) {
            Some(r) => Value::Int(r),
            None => Value::Float(float_op(*x as f64, *y as f64)),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::Float(float_op(x, y)),
            _ => Value::Null,
        },
    }
}

fn apply(doc: &Document, op: &str, operand: &Value) -> Value {
    match op {
        "$eq" => match binary_args(doc, operand) {
            Some((a, b)) => Value::Bool(values_equal(&a, &b)),
            None => Value::Null,
        },
        "$ne" => match binary_args(doc, operand) {
            Some((a, b)) => Value::Bool(!values_equal(&a, &b)),
            None => Value::Null,
        },
        "$gt" => comparison(doc, operand, |o| o == Ordering::Greater),
        "$gte" => comparison(doc, operand, |o| o != Ordering::Less),
        "$lt" => comparison(doc, operand, |o| o == Ordering::Less),
        "$lte" => comparison(doc, operand, |o| o != Ordering::Greater),
        "$add" => match binary_args(doc, operand) {
            Some((a, b)) => arith(&a, &b, i64::checked_add, |x, y| x + y),
            None => Value::Null,
        },
        "$subtract" => match binary_args(doc, operand) {
            Some((a, b)) => arith(&a, &b, i64::checked_sub, |x, y| x - y),
            None => Value::Null,
        },
        "$multiply" => match binary_args(doc, operand) {
            Some((a, b)) => arith(&a, &b, i64::checked_mul, |x, y| x * y),
            None => Value::Null,
        },
        "$divide" => match binary_args(doc, operand) {
            Some((a, b)) => match (a.as_f64(), b.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => Value::Null,
                (Some(x), Some(y)) => Value::Float(x / y),
                _ => Value::Null,
            },
            None => Value::Null,
        },
        "$mod" => match binary_args(doc, operand) {
            Some((a, b)) => match (a.as_i64(), b.as_i64()) {
                (Some(_), Some(0)) => Value::Null,
                (Some(x), Some(y)) => Value::Int(x % y),
                _ => Value::Null,
            },
            None => Value::Null,
        },
        "$cond" => {
            let (condition, then_branch, else_branch) = match operand {
                Value::Array(args) if args.len() == 3 => (&args[0], &args[1], &args[2]),
                Value::Object(map) => {
                    match (map.get("if"), map.get("then"), map.get("else")) {
                        (Some(i), Some(t), Some(e)) => (i, t, e),
                        _ => return Value::Null,
                    }
                }
                _ => return Value::Null,
            };
            if is_truthy(&eval_expr(doc, condition)) {
                eval_expr(doc, then_branch)
            } else {
                eval_expr(doc, else_branch)
            }
        }
        unknown => {
            warn!(operator = unknown, "unknown expression operator");
            Value::Null
        }
    }
}
