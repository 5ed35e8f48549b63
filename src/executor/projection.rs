//! Field selection

use crate::value::Item;

/// Restricts items to selected fields
pub struct Projection;

impl Projection {
    /// Keeps `select` plus the `always` fields on every item.
    ///
    /// `always` carries join local keys so edges can still be resolved after
    /// projection. Fields absent from an item are not added.
    pub fn apply(items: Vec<Item>, select: &[String], always: &[&str]) -> Vec<Item> {
        items
            .into_iter()
            .map(|mut item| {
                item.retain(|field, _| {
                    select.iter().any(|s| s == field) || always.contains(&field.as_str())
                });
                item
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_selects_fields() {
        let out = Projection::apply(
            vec![item(json!({"id": 1, "name": "a", "secret": "x"}))],
            &["id".to_string(), "name".to_string()],
            &[],
        );
        assert_eq!(Value::Object(out[0].clone()), json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn test_join_keys_survive() {
        let out = Projection::apply(
            vec![item(json!({"id": 1, "userId": "u1", "secret": "x"}))],
            &["id".to_string()],
            &["userId"],
        );
        assert_eq!(Value::Object(out[0].clone()), json!({"id": 1, "userId": "u1"}));
    }

    #[test]
    fn test_missing_fields_not_added() {
        let out = Projection::apply(
            vec![item(json!({"id": 1}))],
            &["id".to_string(), "name".to_string()],
            &[],
        );
        assert_eq!(out[0].len(), 1);
    }
}
