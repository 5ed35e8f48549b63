//! Operator registry
//!
//! One fixed entry per [`Operator`]: whether the store can evaluate it,
//! how to render its native fragment, and how to evaluate it in memory.
//! The entries are never mutated after startup.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::Operator;
use super::expressions::ExpressionContext;
use crate::store::MAX_BATCH_GET_KEYS;
use crate::value::{compare_values, is_missing, values_equal};

/// Most operands a native `IN (...)` list may carry
pub const MAX_IN_OPERANDS: usize = MAX_BATCH_GET_KEYS;

/// Renders a native fragment for `name_token <op> value`
pub type BuildFn = fn(&str, &Value, &mut ExpressionContext) -> Option<String>;

/// Evaluates the operator against an item attribute
pub type EvalFn = fn(Option<&Value>, &Value) -> bool;

/// Registry entry
pub struct OperatorSpec {
    pub operator: Operator,
    /// The store has no native form for this operator
    pub client_only: bool,
    pub build: BuildFn,
    pub evaluate: EvalFn,
}

impl OperatorSpec {
    /// Whether `value` can be sent to the store with this operator
    pub fn is_native_for(&self, value: &Value) -> bool {
        if self.client_only {
            return false;
        }
        match self.operator {
            Operator::In | Operator::NotIn => match value {
                Value::Array(list) => !list.is_empty() && list.len() <= MAX_IN_OPERANDS,
                _ => false,
            },
            _ => true,
        }
    }
}

static REGISTRY: [OperatorSpec; 11] = [
    OperatorSpec {
        operator: Operator::Eq,
        client_only: false,
        build: build_eq,
        evaluate: eval_eq,
    },
    OperatorSpec {
        operator: Operator::Ne,
        client_only: false,
        build: build_ne,
        evaluate: eval_ne,
    },
    OperatorSpec {
        operator: Operator::Gt,
        client_only: false,
        build: build_gt,
        evaluate: eval_gt,
    },
    OperatorSpec {
        operator: Operator::Gte,
        client_only: false,
        build: build_gte,
        evaluate: eval_gte,
    },
    OperatorSpec {
        operator: Operator::Lt,
        client_only: false,
        build: build_lt,
        evaluate: eval_lt,
    },
    OperatorSpec {
        operator: Operator::Lte,
        client_only: false,
        build: build_lte,
        evaluate: eval_lte,
    },
    OperatorSpec {
        operator: Operator::In,
        client_only: false,
        build: build_in,
        evaluate: eval_in,
    },
    OperatorSpec {
        operator: Operator::NotIn,
        client_only: false,
        build: build_not_in,
        evaluate: eval_not_in,
    },
    OperatorSpec {
        operator: Operator::Contains,
        client_only: false,
        build: build_contains,
        evaluate: eval_contains,
    },
    OperatorSpec {
        operator: Operator::StartsWith,
        client_only: false,
        build: build_starts_with,
        evaluate: eval_starts_with,
    },
    OperatorSpec {
        operator: Operator::EndsWith,
        client_only: true,
        build: build_none,
        evaluate: eval_ends_with,
    },
];

/// Looks up the registry entry for an operator
pub fn operator_spec(operator: Operator) -> &'static OperatorSpec {
    let index = match operator {
        Operator::Eq => 0,
        Operator::Ne => 1,
        Operator::Gt => 2,
        Operator::Gte => 3,
        Operator::Lt => 4,
        Operator::Lte => 5,
        Operator::In => 6,
        Operator::NotIn => 7,
        Operator::Contains => 8,
        Operator::StartsWith => 9,
        Operator::EndsWith => 10,
    };
    &REGISTRY[index]
}

// ---------- native fragments ----------

fn comparison(name: &str, symbol: &str, value: &Value, ctx: &mut ExpressionContext) -> String {
    format!("{} {} {}", name, symbol, ctx.value(value.clone()))
}

fn build_eq(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, "=", value, ctx))
}

fn build_ne(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, "<>", value, ctx))
}

fn build_gt(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, ">", value, ctx))
}

fn build_gte(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, ">=", value, ctx))
}

fn build_lt(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, "<", value, ctx))
}

fn build_lte(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(comparison(name, "<=", value, ctx))
}

fn membership(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    let list = match value {
        Value::Array(list) if !list.is_empty() && list.len() <= MAX_IN_OPERANDS => list,
        _ => return None,
    };
    let tokens: Vec<String> = list.iter().map(|v| ctx.value(v.clone())).collect();
    Some(format!("{} IN ({})", name, tokens.join(", ")))
}

fn build_in(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    membership(name, value, ctx)
}

fn build_not_in(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    membership(name, value, ctx).map(|inner| format!("NOT ({})", inner))
}

fn build_contains(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(format!("contains({}, {})", name, ctx.value(value.clone())))
}

fn build_starts_with(name: &str, value: &Value, ctx: &mut ExpressionContext) -> Option<String> {
    Some(format!("begins_with({}, {})", name, ctx.value(value.clone())))
}

fn build_none(_name: &str, _value: &Value, _ctx: &mut ExpressionContext) -> Option<String> {
    None
}

// ---------- in-memory evaluation ----------

fn eval_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(a) => values_equal(a, expected),
        None => expected.is_null(),
    }
}

fn eval_ne(actual: Option<&Value>, expected: &Value) -> bool {
    !eval_eq(actual, expected)
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: fn(Ordering) -> bool) -> bool {
    if is_missing(actual) {
        return false;
    }
    actual
        .and_then(|a| compare_values(a, expected))
        .map(accept)
        .unwrap_or(false)
}

fn eval_gt(actual: Option<&Value>, expected: &Value) -> bool {
    ordered(actual, expected, |o| o == Ordering::Greater)
}

fn eval_gte(actual: Option<&Value>, expected: &Value) -> bool {
    ordered(actual, expected, |o| o != Ordering::Less)
}

fn eval_lt(actual: Option<&Value>, expected: &Value) -> bool {
    ordered(actual, expected, |o| o == Ordering::Less)
}

fn eval_lte(actual: Option<&Value>, expected: &Value) -> bool {
    ordered(actual, expected, |o| o != Ordering::Greater)
}

fn eval_in(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(a) = actual else {
        return false;
    };
    match expected {
        Value::Array(list) => list.iter().any(|v| values_equal(a, v)),
        other => values_equal(a, other),
    }
}

fn eval_not_in(actual: Option<&Value>, expected: &Value) -> bool {
    !eval_in(actual, expected)
}

fn eval_contains(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(list)), needle) => list.iter().any(|v| values_equal(v, needle)),
        _ => false,
    }
}

fn eval_starts_with(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Value::String(prefix)) => s.starts_with(prefix.as_str()),
        _ => false,
    }
}

fn eval_ends_with(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Value::String(suffix)) => s.ends_with(suffix.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_order_matches_operator() {
        for op in [
            Operator::Eq,
            Operator::Ne,
            Operator::Gt,
            Operator::Gte,
            Operator::Lt,
            Operator::Lte,
            Operator::In,
            Operator::NotIn,
            Operator::Contains,
            Operator::StartsWith,
            Operator::EndsWith,
        ] {
            assert_eq!(operator_spec(op).operator, op);
        }
    }

    #[test]
    fn test_only_ends_with_is_client_only() {
        assert!(operator_spec(Operator::EndsWith).client_only);
        assert!(!operator_spec(Operator::StartsWith).client_only);
        assert!(!operator_spec(Operator::EndsWith).is_native_for(&json!("x")));
    }

    #[test]
    fn test_in_operand_bounds() {
        let spec = operator_spec(Operator::In);
        assert!(spec.is_native_for(&json!([1, 2])));
        assert!(!spec.is_native_for(&json!([])));
        assert!(!spec.is_native_for(&json!("scalar")));
        let big: Vec<i64> = (0..101).collect();
        assert!(!spec.is_native_for(&json!(big)));
    }

    #[test]
    fn test_native_fragments() {
        let mut ctx = ExpressionContext::new();
        let name = ctx.name("status");
        assert_eq!(
            (operator_spec(Operator::Ne).build)(&name, &json!("x"), &mut ctx).unwrap(),
            "#f0 <> :v0"
        );
        assert_eq!(
            (operator_spec(Operator::NotIn).build)(&name, &json!(["a", "b"]), &mut ctx).unwrap(),
            "NOT (#f0 IN (:v1, :v2))"
        );
        assert_eq!(
            (operator_spec(Operator::StartsWith).build)(&name, &json!("ab"), &mut ctx).unwrap(),
            "begins_with(#f0, :v3)"
        );
        assert!((operator_spec(Operator::EndsWith).build)(&name, &json!("z"), &mut ctx).is_none());
    }

    #[test]
    fn test_evaluation() {
        let eval = |op: Operator, actual: Option<&Value>, expected: Value| {
            (operator_spec(op).evaluate)(actual, &expected)
        };
        assert!(eval(Operator::Eq, Some(&json!(3)), json!(3.0)));
        assert!(eval(Operator::Ne, None, json!("x")));
        assert!(!eval(Operator::Gt, None, json!(1)));
        assert!(eval(Operator::Gte, Some(&json!(2)), json!(2)));
        assert!(!eval(Operator::Lt, Some(&json!("a")), json!(1)));
        assert!(eval(Operator::In, Some(&json!("b")), json!(["a", "b"])));
        assert!(eval(Operator::NotIn, Some(&json!("c")), json!(["a", "b"])));
        assert!(eval(Operator::Contains, Some(&json!(["x", "y"])), json!("y")));
        assert!(eval(Operator::Contains, Some(&json!("hello")), json!("ell")));
        assert!(eval(Operator::StartsWith, Some(&json!("hello")), json!("he")));
        assert!(eval(Operator::EndsWith, Some(&json!("hello")), json!("lo")));
        assert!(!eval(Operator::EndsWith, Some(&json!(5)), json!("5")));
    }
}
