//! Where-clause normalization

use super::ast::{Condition, Connector, NormalizedCondition, Operator};
use super::operators::operator_spec;
use crate::catalog::SchemaResolver;
use crate::errors::{AdapterError, AdapterResult};

/// Normalizes raw conditions for `model`.
///
/// Operators default to `eq`, connectors to `AND`, field names are mapped
/// to physical attributes, and each condition is flagged when the store
/// cannot evaluate it. An unknown operator fails the whole set.
pub fn normalize_conditions(
    model: &str,
    conditions: &[Condition],
    schema: &dyn SchemaResolver,
) -> AdapterResult<Vec<NormalizedCondition>> {
    conditions
        .iter()
        .map(|raw| normalize_condition(model, raw, schema))
        .collect()
}

fn normalize_condition(
    model: &str,
    raw: &Condition,
    schema: &dyn SchemaResolver,
) -> AdapterResult<NormalizedCondition> {
    let operator = match raw.operator.as_deref() {
        None => Operator::Eq,
        Some(name) => {
            Operator::parse(name).ok_or_else(|| AdapterError::unsupported_operator(name))?
        }
    };
    let spec = operator_spec(operator);

    Ok(NormalizedCondition {
        field: schema.field_name(model, &raw.field),
        operator,
        value: raw.value.clone(),
        connector: Connector::parse(raw.connector.as_deref()),
        requires_client_filter: !spec.is_native_for(&raw.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelDef, StaticSchema};
    use crate::errors::AdapterErrorCode;
    use serde_json::json;

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .with_model(ModelDef::new("user", "users", "id").with_field("emailAddress", "email"))
    }

    #[test]
    fn test_defaults_applied() {
        let schema = schema();
        let out = normalize_conditions(
            "user",
            &[Condition::eq("emailAddress", json!("a@b.c"))],
            &schema,
        )
        .unwrap();
        assert_eq!(out[0].field, "email");
        assert_eq!(out[0].operator, Operator::Eq);
        assert_eq!(out[0].connector, Connector::And);
        assert!(!out[0].requires_client_filter);
    }

    #[test]
    fn test_client_filter_flags() {
        let schema = schema();
        let out = normalize_conditions(
            "user",
            &[
                Condition::new("name", "ends_with", json!("son")),
                Condition::new("id", "in", json!([])),
                Condition::new("id", "NOT_IN", json!(["a"])).or(),
            ],
            &schema,
        )
        .unwrap();
        assert!(out[0].requires_client_filter);
        assert!(out[1].requires_client_filter);
        assert!(!out[2].requires_client_filter);
        assert_eq!(out[2].operator, Operator::NotIn);
        assert_eq!(out[2].connector, Connector::Or);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let schema = schema();
        let err = normalize_conditions(
            "user",
            &[Condition::new("name", "regex", json!(".*"))],
            &schema,
        )
        .unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::UnsupportedOperator);
        assert!(err.message().contains("regex"));
    }
}
