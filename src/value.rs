//! Item and value helpers
//!
//! An [`Item`] is an open attribute map. Values use `serde_json::Value`,
//! which is already the closed recursive variant the store speaks:
//! null, bool, number, string, list, map.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::{Map, Value};

/// One stored item (attribute name → value)
pub type Item = Map<String, Value>;

/// Looks up a top-level attribute, treating JSON null as present.
pub fn get_field<'a>(item: &'a Item, field: &str) -> Option<&'a Value> {
    item.get(field)
}

/// Returns true when the attribute is absent or null.
pub fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Equality with numeric normalization (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xf), Some(yf)) => xf == yf,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Orders two values when they share a comparable type.
///
/// Numbers compare numerically, strings that both parse as RFC 3339
/// timestamps compare chronologically, other strings lexically, booleans
/// `false < true`. Anything else is incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Canonical string form of a value, used to group and deduplicate keys.
///
/// Integral numbers render without a fraction so `7` and `7.0` collide.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("n:{}", f as i64),
            _ => format!("n:{}", n),
        },
        Value::String(s) => format!("s:{}", s),
        other => format!("j:{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_equality_normalizes() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_compare_dates_chronologically() {
        // Lexically "2024-01-01T10:00:00+02:00" > "2024-01-01T09:00:00Z",
        // chronologically it is earlier.
        let a = json!("2024-01-01T10:00:00+02:00");
        let b = json!("2024-01-01T09:00:00Z");
        assert_eq!(compare_values(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn test_mixed_types_incomparable() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert_eq!(compare_values(&json!(null), &json!(null)), None);
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key(&json!(7)), canonical_key(&json!(7.0)));
        assert_ne!(canonical_key(&json!(7)), canonical_key(&json!("7")));
    }
}
