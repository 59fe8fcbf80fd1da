//! Structural equality over JSON values.
//!
//! This is the single test used to decide whether a stored call record still
//! describes the current call. The rules are:
//! - objects compare by key set and per-key value, key order is ignored;
//! - arrays compare positionally, order matters;
//! - primitives compare by kind and value, so `null`, `false`, `0` and `""`
//!   are all distinct.
//!
//! Numbers follow JSON rather than Rust integer/float typing: `1` and `1.0`
//! are the same number.

use serde_json::{Number, Value};
use std::fmt;

/// Kind of a JSON value, as reported in differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl JsonKind {
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Object(_) => Self::Object,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deep structural equality.
///
/// Agrees with [`first_difference`] but builds no paths.
pub fn json_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(left), Value::Bool(right)) => left == right,
        (Value::String(left), Value::String(right)) => left == right,
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| json_equals(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, l)| right.get(key).is_some_and(|r| json_equals(l, r)))
        }
        _ => false,
    }
}

/// A located difference between two JSON values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonDifference {
    /// JSONPath-like location, `$` for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for JsonDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Returns the first difference found walking `a` against `b`, or `None`
/// when the values are structurally equal.
pub fn first_difference(a: &Value, b: &Value) -> Option<JsonDifference> {
    diff_at(a, b, "$")
}

fn diff_at(a: &Value, b: &Value, path: &str) -> Option<JsonDifference> {
    match (a, b) {
        (Value::Null, Value::Null) => None,
        (Value::Bool(left), Value::Bool(right)) => {
            (left != right).then(|| value_difference(path, a, b))
        }
        (Value::String(left), Value::String(right)) => {
            (left != right).then(|| value_difference(path, a, b))
        }
        (Value::Number(left), Value::Number(right)) => {
            (!numbers_equal(left, right)).then(|| value_difference(path, a, b))
        }
        (Value::Array(left), Value::Array(right)) => {
            if left.len() != right.len() {
                return Some(JsonDifference {
                    path: path.to_string(),
                    message: format!("length mismatch: {} vs {}", left.len(), right.len()),
                });
            }
            left.iter()
                .zip(right)
                .enumerate()
                .find_map(|(idx, (l, r))| diff_at(l, r, &format!("{path}[{idx}]")))
        }
        (Value::Object(left), Value::Object(right)) => {
            if left.len() != right.len() {
                return Some(JsonDifference {
                    path: path.to_string(),
                    message: format!("key count mismatch: {} vs {}", left.len(), right.len()),
                });
            }
            for (key, left_value) in left {
                let child = format!("{path}.{key}");
                let Some(right_value) = right.get(key) else {
                    return Some(JsonDifference {
                        path: child,
                        message: "missing on the right".to_string(),
                    });
                };
                if let Some(diff) = diff_at(left_value, right_value, &child) {
                    return Some(diff);
                }
            }
            None
        }
        _ => Some(JsonDifference {
            path: path.to_string(),
            message: format!("kind mismatch: {} vs {}", JsonKind::of(a), JsonKind::of(b)),
        }),
    }
}

fn value_difference(path: &str, a: &Value, b: &Value) -> JsonDifference {
    JsonDifference {
        path: path.to_string(),
        message: format!("{a} vs {b}"),
    }
}

fn numbers_equal(left: &Number, right: &Number) -> bool {
    if left == right {
        return true;
    }
    // Integer vs integer that differ in representation only (u64 vs i64)
    // is already handled by `Number`'s equality; floats compare by value.
    if left.is_f64() || right.is_f64() {
        return matches!((left.as_f64(), right.as_f64()), (Some(l), Some(r)) if l == r);
    }
    false
}
