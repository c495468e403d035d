//! Absorbs the upstream's number-or-array JSON shape before it ever reaches
//! a domain type.
//!
//! Every numeric stat field may arrive as a scalar or as an array whose last
//! element is the most recent sample. This module is the single place that
//! understands that polymorphism.

use serde_json::Value;

/// Decode a counter field: array → last element (truncated to i64), scalar →
/// itself (truncated to i64), missing/null/empty-array → 0.
pub fn decode_counter(value: Option<&Value>) -> i64 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Array(items)) => items
            .last()
            .and_then(Value::as_f64)
            .map(|f| f as i64)
            .unwrap_or(0),
        Some(Value::Number(n)) => n.as_f64().map(|f| f as i64).unwrap_or(0),
        Some(_) => 0,
    }
}

/// Decode an optional size/average field: array → last element, scalar →
/// itself, missing/null/empty-array → `None`.
pub fn decode_optional_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => items.last().and_then(Value::as_f64),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    }
}
