//! Structural diff of two item versions
//!
//! Leaf rules:
//! - attribute gone in `next` → `REMOVE`
//! - both sides numeric → `ADD next - prev`
//! - anything else that changed → `SET` of the next value
//!
//! Value placeholders are shared between instructions carrying the same
//! value, keyed by its JSON text.
//!
//! Maps recurse over the key union, lists index by index (the shorter side
//! padded with "absent").

use std::collections::BTreeSet;

use serde_json::{Number, Value};

use crate::errors::{AdapterError, AdapterResult};
use crate::planner::ExpressionContext;
use crate::store::ExpressionAttributes;
use crate::value::{values_equal, Item};

/// Deepest nesting the diff will walk
pub const MAX_DIFF_DEPTH: usize = 64;

/// A rendered update expression with its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePatch {
    pub expression: String,
    pub attributes: ExpressionAttributes,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug)]
enum Change {
    Set(Vec<Segment>, Value),
    Remove(Vec<Segment>),
    Add(Vec<Segment>, Number),
}

/// Builds a single `SET ... REMOVE ... ADD ...` expression turning `prev`
/// into `next`.
///
/// Fails with `DQ_INVALID_UPDATE` when nothing changed, when a value
/// cannot be serialized, or when nesting exceeds [`MAX_DIFF_DEPTH`].
pub fn build_update(prev: &Item, next: &Item) -> AdapterResult<UpdatePatch> {
    let mut changes = Vec::new();
    diff_maps(&mut Vec::new(), prev, next, 0, &mut changes)?;
    if changes.is_empty() {
        return Err(AdapterError::invalid_update("Update produced no changes"));
    }
    render(changes)
}

fn diff_maps(
    path: &mut Vec<Segment>,
    prev: &Item,
    next: &Item,
    depth: usize,
    out: &mut Vec<Change>,
) -> AdapterResult<()> {
    let keys: BTreeSet<&String> = prev.keys().chain(next.keys()).collect();
    for key in keys {
        path.push(Segment::Key(key.clone()));
        diff_value(path, prev.get(key), next.get(key), depth + 1, out)?;
        path.pop();
    }
    Ok(())
}

fn diff_value(
    path: &mut Vec<Segment>,
    prev: Option<&Value>,
    next: Option<&Value>,
    depth: usize,
    out: &mut Vec<Change>,
) -> AdapterResult<()> {
    if depth > MAX_DIFF_DEPTH {
        return Err(AdapterError::invalid_update(format!(
            "Update nesting exceeds {} levels",
            MAX_DIFF_DEPTH
        )));
    }

    match (prev, next) {
        (None, None) => {}
        (Some(_), None) => out.push(Change::Remove(path.clone())),
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            diff_maps(path, a, b, depth, out)?;
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for i in 0..a.len().max(b.len()) {
                path.push(Segment::Index(i));
                diff_value(path, a.get(i), b.get(i), depth + 1, out)?;
                path.pop();
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            if !values_equal(&Value::Number(a.clone()), &Value::Number(b.clone())) {
                out.push(Change::Add(path.clone(), numeric_delta(a, b)?));
            }
        }
        (prev, Some(next)) => {
            let changed = prev.map(|p| !values_equal(p, next)).unwrap_or(true);
            if changed {
                out.push(Change::Set(path.clone(), next.clone()));
            }
        }
    }
    Ok(())
}

fn numeric_delta(prev: &Number, next: &Number) -> AdapterResult<Number> {
    if let (Some(a), Some(b)) = (prev.as_i64(), next.as_i64()) {
        if let Some(delta) = b.checked_sub(a) {
            return Ok(Number::from(delta));
        }
    }
    let delta = next.as_f64().unwrap_or(0.0) - prev.as_f64().unwrap_or(0.0);
    Number::from_f64(delta)
        .ok_or_else(|| AdapterError::invalid_update("Numeric difference is not finite"))
}

fn value_key(value: &Value) -> AdapterResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AdapterError::invalid_update(format!("Cannot serialize value: {}", e)))
}

fn render_path(path: &[Segment], ctx: &mut ExpressionContext) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            Segment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(&ctx.name(key));
            }
            Segment::Index(i) => rendered.push_str(&format!("[{}]", i)),
        }
    }
    rendered
}

fn render(changes: Vec<Change>) -> AdapterResult<UpdatePatch> {
    let mut ctx = ExpressionContext::new();
    let mut sets = Vec::new();
    let mut removes = Vec::new();
    let mut adds = Vec::new();

    for change in changes {
        match change {
            Change::Set(path, value) => {
                let name = render_path(&path, &mut ctx);
                let token = ctx.shared_value(value_key(&value)?, value);
                sets.push(format!("{} = {}", name, token));
            }
            Change::Remove(path) => removes.push(render_path(&path, &mut ctx)),
            Change::Add(path, delta) => {
                let name = render_path(&path, &mut ctx);
                let delta = Value::Number(delta);
                let token = ctx.shared_value(value_key(&delta)?, delta);
                adds.push(format!("{} {}", name, token));
            }
        }
    }

    let mut clauses = Vec::new();
    if !sets.is_empty() {
        clauses.push(format!("SET {}", sets.join(", ")));
    }
    if !removes.is_empty() {
        clauses.push(format!("REMOVE {}", removes.join(", ")));
    }
    if !adds.is_empty() {
        clauses.push(format!("ADD {}", adds.join(", ")));
    }

    Ok(UpdatePatch {
        expression: clauses.join(" "),
        attributes: ctx.into_attributes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdapterErrorCode;
    use serde_json::json;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_numeric_change_is_add_and_string_change_is_set() {
        let patch = build_update(
            &item(json!({"count": 3, "name": "a"})),
            &item(json!({"count": 5, "name": "b"})),
        )
        .unwrap();
        // attributes are visited in key order: count, then name
        assert_eq!(patch.expression, "SET #f1 = :v1 ADD #f0 :v0");
        assert_eq!(patch.attributes.names["#f0"], "count");
        assert_eq!(patch.attributes.names["#f1"], "name");
        assert_eq!(patch.attributes.values[":v0"], json!(2));
        assert_eq!(patch.attributes.values[":v1"], json!("b"));
    }

    #[test]
    fn test_missing_attribute_is_removed() {
        let patch = build_update(
            &item(json!({"token": "t", "ip": "x"})),
            &item(json!({"token": "t"})),
        )
        .unwrap();
        assert_eq!(patch.expression, "REMOVE #f0");
        assert_eq!(patch.attributes.names["#f0"], "ip");
        assert!(patch.attributes.values.is_empty());
    }

    #[test]
    fn test_non_string_set_values_keep_their_type() {
        let patch = build_update(
            &item(json!({"active": false})),
            &item(json!({"active": true, "meta": {"a": 1}, "gone": null})),
        )
        .unwrap();
        assert_eq!(patch.expression, "SET #f0 = :v0, #f1 = :v1, #f2 = :v2");
        assert_eq!(patch.attributes.values[":v0"], json!(true));
        assert_eq!(patch.attributes.values[":v1"], Value::Null);
        assert_eq!(patch.attributes.values[":v2"], json!({"a": 1}));
    }

    #[test]
    fn test_equal_values_share_a_placeholder() {
        let patch = build_update(
            &item(json!({"a": "x", "b": "y", "c": 1, "d": 1})),
            &item(json!({"a": "z", "b": "z", "c": 3, "d": 3, "e": "2"})),
        )
        .unwrap();
        assert_eq!(
            patch.expression,
            "SET #f0 = :v0, #f1 = :v0, #f4 = :v2 ADD #f2 :v1, #f3 :v1"
        );
        assert_eq!(patch.attributes.values.len(), 3);
        assert_eq!(patch.attributes.values[":v0"], json!("z"));
        assert_eq!(patch.attributes.values[":v1"], json!(2));
        assert_eq!(patch.attributes.values[":v2"], json!("2"));
    }

    #[test]
    fn test_nested_paths() {
        let patch = build_update(
            &item(json!({"profile": {"tags": ["a", "b", "c"], "age": 30}})),
            &item(json!({"profile": {"tags": ["a", "x"], "age": 31}})),
        )
        .unwrap();
        assert_eq!(
            patch.expression,
            "SET #f0.#f2[1] = :v1 REMOVE #f0.#f2[2] ADD #f0.#f1 :v0"
        );
        assert_eq!(patch.attributes.names["#f0"], "profile");
        assert_eq!(patch.attributes.names["#f1"], "age");
        assert_eq!(patch.attributes.names["#f2"], "tags");
    }

    #[test]
    fn test_empty_diff_rejected() {
        let err = build_update(&item(json!({"a": 1})), &item(json!({"a": 1.0}))).unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::InvalidUpdate);
    }

    #[test]
    fn test_depth_bound() {
        let mut deep = json!(1);
        for _ in 0..70 {
            deep = json!({ "n": deep });
        }
        let mut other = json!(2);
        for _ in 0..70 {
            other = json!({ "n": other });
        }
        let err = build_update(&item(json!({"root": deep})), &item(json!({"root": other})))
            .unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::InvalidUpdate);
    }
}
