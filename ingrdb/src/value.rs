// Scalar value model for record fields, plus the total ordering used
// when sorting records by a column.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A dynamically-typed scalar stored in a record field.
///
/// Record files carry loosely-typed data, so a field is one of a small
/// closed set of scalar kinds. Nested mappings or sequences are not valid
/// field values and fail deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Renders the value the way it appears in TSV/CSV cells: nulls are empty,
/// everything else uses its natural textual form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> serde_json::Value {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Total ordering over heterogeneous scalars.
///
/// Same-kind strings and numbers compare natively. A numeric left-hand side
/// coerces the right-hand side to its own kind (an `Int` left truncates a
/// `Float` right; a `Float` left widens an `Int` right); a left-hand side of
/// a comparable kind against a value that cannot be coerced sorts after it.
/// Every remaining pairing falls back to comparing display strings, so the
/// ordering never fails.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match left {
        Value::String(l) => match right {
            Value::String(r) => l.cmp(r),
            _ => Ordering::Greater,
        },
        Value::Int(l) => match right.as_i64() {
            Some(r) => l.cmp(&r),
            None => Ordering::Greater,
        },
        Value::Float(l) => match right.as_f64() {
            Some(r) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            None => Ordering::Greater,
        },
        _ => left.to_string().cmp(&right.to_string()),
    }
}
