//! Dotted field-path resolution
//!
//! Paths use `.` as a separator. An all-digit component indexes
//! positionally when the current value is an array, otherwise it is an
//! object key. A miss at any step yields `None`: "undefined" is never an
//! error at this level; the matcher decides what it means.

use crate::value::{Document, Value};

fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Array(items) if segment.bytes().all(|b| b.is_ascii_digit()) => {
            items.get(segment.parse::<usize>().ok()?)
        }
        Value::Object(doc) => doc.get(segment),
        _ => None,
    }
}

/// Resolve `path` against `doc`
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Set `path` in `doc`, creating intermediate objects as needed
///
/// A numeric component into an existing array sets in place when the index
/// is in range, appends at `len`, and pads with `Null` beyond it. Setting
/// through a scalar replaces it with an object.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.is_empty() {
        return;
    }
    if segments.len() == 1 {
        doc.set(segments[0], value);
        return;
    }
    // Walk down to the parent of the leaf, materialising objects on the way.
    if doc.get(segments[0]).map_or(true, |v| {
        !matches!(v, Value::Object(_) | Value::Array(_))
    }) {
        doc.set(segments[0], Value::Object(Document::new()));
    }
    let mut current = doc
        .get_mut(segments[0])
        .expect("first segment materialised above");
    for (i, segment) in segments[1..].iter().enumerate() {
        let is_leaf = i == segments.len() - 2;
        let is_array_index = matches!(current, Value::Array(_)) && segment.bytes().all(|b| b.is_ascii_digit());
        if is_array_index {
            let items = match current {
                Value::Array(items) => items,
                _ => unreachable!(),
            };
            let idx: usize = segment.parse().unwrap_or(0);
            while items.len() <= idx {
                items.push(Value::Null);
            }
            if is_leaf {
                items[idx] = value;
                return;
            }
            if !matches!(items[idx], Value::Object(_) | Value::Array(_)) {
                items[idx] = Value::Object(Document::new());
            }
            current = &mut items[idx];
            continue;
        }
        match current {
            Value::Object(inner) => {
                if is_leaf {
                    inner.set(*segment, value);
                    return;
                }
                if inner.get(segment).map_or(true, |v| {
                    !matches!(v, Value::Object(_) | Value::Array(_))
                }) {
                    inner.set(*segment, Value::Object(Document::new()));
                }
                current = inner
                    .get_mut(segment)
                    .expect("segment materialised above");
            }
            other => {
                // Scalar in the middle of the path: becomes an object
                *other = Value::Object(Document::new());
                if let Value::Object(inner) = other {
                    if is_leaf {
                        inner.set(*segment, value);
                        return;
                    }
                    inner.set(*segment, Value::Object(Document::new()));
                    current = inner
                        .get_mut(segment)
                        .expect("segment materialised above");
                } else {
                    unreachable!()
                }
            }
        }
    }
}

/// Remove the value at `path`, returning it
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, path),
    };
    match parent {
        None => doc.remove(leaf),
        Some(parent_path) => {
            let segments: Vec<&str> = parent_path.split('.').collect();
            let mut current = doc.get_mut(segments[0])?;
            for segment in &segments[1..] {
                current = match current {
                    Value::Array(items) if segment.bytes().all(|b| b.is_ascii_digit()) => {
                        items.get_mut(segment.parse::<usize>().ok()?)?
                    }
                    Value::Object(inner) => inner.get_mut(segment)?,
                    _ => return None,
                };
            }
            match current {
                Value::Object(inner) => inner.remove(leaf),
                _ => None,
            }
        }
    }
}
