//! Key-condition and filter-expression builders
//!
//! Both builders write into one [`ExpressionContext`] per request so the
//! key condition and filter share a single placeholder table.

use std::collections::HashMap;

use serde_json::Value;

use super::ast::{Connector, NormalizedCondition};
use super::operators::operator_spec;
use super::strategy::KeyMatch;
use crate::store::ExpressionAttributes;

/// Placeholder allocator for one request
#[derive(Debug, Default)]
pub struct ExpressionContext {
    attributes: ExpressionAttributes,
    name_tokens: HashMap<String, String>,
    value_tokens: HashMap<String, String>,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for an attribute name; repeated names reuse their token
    pub fn name(&mut self, field: &str) -> String {
        if let Some(token) = self.name_tokens.get(field) {
            return token.clone();
        }
        let token = format!("#f{}", self.attributes.names.len());
        self.attributes
            .names
            .insert(token.clone(), field.to_string());
        self.name_tokens.insert(field.to_string(), token.clone());
        token
    }

    /// Fresh token for a literal value
    pub fn value(&mut self, value: Value) -> String {
        let token = format!(":v{}", self.attributes.values.len());
        self.attributes.values.insert(token.clone(), value);
        token
    }

    /// Token for a literal value shared by every value with the same `key`.
    ///
    /// Only update expressions share value tokens; conditions use
    /// [`ExpressionContext::value`].
    pub fn shared_value(&mut self, key: String, value: Value) -> String {
        if let Some(token) = self.value_tokens.get(&key) {
            return token.clone();
        }
        let token = self.value(value);
        self.value_tokens.insert(key, token.clone());
        token
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn into_attributes(self) -> ExpressionAttributes {
        self.attributes
    }
}

/// Rendered key condition and the conditions it did not consume
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub index_name: Option<String>,
    pub expression: String,
    pub remaining: Vec<NormalizedCondition>,
}

/// Renders `#pk = :pk [AND #sk = :sk]` for a resolved key match
pub fn build_key_condition(
    key: &KeyMatch,
    conditions: &[NormalizedCondition],
    ctx: &mut ExpressionContext,
) -> KeyCondition {
    let partition = &conditions[key.partition];
    let mut expression = partition_condition(&partition.field, &partition.value, ctx);

    if let Some(sort) = key.sort.map(|i| &conditions[i]) {
        let name = ctx.name(&sort.field);
        let value = ctx.value(sort.value.clone());
        expression = format!("{} AND {} = {}", expression, name, value);
    }

    let remaining = conditions
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != key.partition && Some(*i) != key.sort)
        .map(|(_, c)| c.clone())
        .collect();

    KeyCondition {
        index_name: key.index_name.clone(),
        expression,
        remaining,
    }
}

/// Renders `#field = :value`
pub fn partition_condition(field: &str, value: &Value, ctx: &mut ExpressionContext) -> String {
    let name = ctx.name(field);
    let value = ctx.value(value.clone());
    format!("{} = {}", name, value)
}

/// Renders `#field IN (:v0, :v1, ...)` for a non-empty value chunk
pub fn render_in_filter(field: &str, values: &[Value], ctx: &mut ExpressionContext) -> String {
    let name = ctx.name(field);
    let tokens: Vec<String> = values.iter().map(|v| ctx.value(v.clone())).collect();
    format!("{} IN ({})", name, tokens.join(", "))
}

/// Native filter for the given conditions.
///
/// Returns `None` when there is nothing to send or when any condition has
/// to be evaluated in memory.
pub fn build_filter_expression(
    conditions: &[NormalizedCondition],
    ctx: &mut ExpressionContext,
) -> Option<String> {
    if conditions.is_empty() {
        return None;
    }
    if conditions
        .iter()
        .any(|c| c.requires_client_filter || c.connector == Connector::Or)
    {
        return None;
    }
    render_filter_groups(conditions, ctx)
}

/// Renders `(AND-group) AND (OR-group)`, or whichever group is non-empty.
pub(crate) fn render_filter_groups(
    conditions: &[NormalizedCondition],
    ctx: &mut ExpressionContext,
) -> Option<String> {
    let mut and_group = Vec::new();
    let mut or_group = Vec::new();

    for condition in conditions {
        let name = ctx.name(&condition.field);
        let fragment = (operator_spec(condition.operator).build)(&name, &condition.value, ctx)?;
        match condition.connector {
            Connector::And => and_group.push(fragment),
            Connector::Or => or_group.push(fragment),
        }
    }

    match (and_group.is_empty(), or_group.is_empty()) {
        (true, true) => None,
        (false, true) => Some(and_group.join(" AND ")),
        (true, false) => Some(or_group.join(" OR ")),
        (false, false) => Some(format!(
            "({}) AND ({})",
            and_group.join(" AND "),
            or_group.join(" OR ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KeySchema;
    use crate::planner::ast::Operator;
    use serde_json::json;

    fn cond(field: &str, operator: Operator, value: Value, connector: Connector) -> NormalizedCondition {
        NormalizedCondition {
            field: field.to_string(),
            operator,
            value,
            connector,
            requires_client_filter: operator == Operator::EndsWith,
        }
    }

    #[test]
    fn test_names_are_deduplicated_values_are_not() {
        let mut ctx = ExpressionContext::new();
        assert_eq!(ctx.name("a"), "#f0");
        assert_eq!(ctx.name("b"), "#f1");
        assert_eq!(ctx.name("a"), "#f0");
        assert_eq!(ctx.value(json!(1)), ":v0");
        assert_eq!(ctx.value(json!(1)), ":v1");
        let attrs = ctx.into_attributes();
        assert_eq!(attrs.names.len(), 2);
        assert_eq!(attrs.values.len(), 2);
    }

    #[test]
    fn test_key_condition_consumes_partition_and_sort() {
        let conditions = vec![
            cond("status", Operator::Eq, json!("active"), Connector::And),
            cond("userId", Operator::Eq, json!("u1"), Connector::And),
            cond("createdAt", Operator::Eq, json!(5), Connector::And),
        ];
        let key = KeyMatch {
            index_name: Some("user_idx".into()),
            key_schema: KeySchema::composite("userId", "createdAt"),
            partition: 1,
            sort: Some(2),
            score: 2,
        };
        let mut ctx = ExpressionContext::new();
        let kc = build_key_condition(&key, &conditions, &mut ctx);
        assert_eq!(kc.expression, "#f0 = :v0 AND #f1 = :v1");
        assert_eq!(kc.index_name.as_deref(), Some("user_idx"));
        assert_eq!(kc.remaining.len(), 1);
        assert_eq!(kc.remaining[0].field, "status");

        let filter = build_filter_expression(&kc.remaining, &mut ctx).unwrap();
        assert_eq!(filter, "#f2 = :v2");
        let attrs = ctx.into_attributes();
        assert_eq!(attrs.names["#f0"], "userId");
        assert_eq!(attrs.values[":v2"], json!("active"));
    }

    #[test]
    fn test_filter_and_group() {
        let conditions = vec![
            cond("age", Operator::Gte, json!(18), Connector::And),
            cond("tags", Operator::Contains, json!("x"), Connector::And),
        ];
        let mut ctx = ExpressionContext::new();
        assert_eq!(
            build_filter_expression(&conditions, &mut ctx).unwrap(),
            "#f0 >= :v0 AND contains(#f1, :v1)"
        );
    }

    #[test]
    fn test_or_connector_disables_native_filter() {
        let conditions = vec![
            cond("a", Operator::Eq, json!(1), Connector::And),
            cond("b", Operator::Eq, json!(2), Connector::Or),
        ];
        let mut ctx = ExpressionContext::new();
        assert!(build_filter_expression(&conditions, &mut ctx).is_none());
    }

    #[test]
    fn test_client_only_condition_disables_native_filter() {
        let conditions = vec![
            cond("a", Operator::Eq, json!(1), Connector::And),
            cond("name", Operator::EndsWith, json!("son"), Connector::And),
        ];
        let mut ctx = ExpressionContext::new();
        assert!(build_filter_expression(&conditions, &mut ctx).is_none());
    }

    #[test]
    fn test_in_filter() {
        let mut ctx = ExpressionContext::new();
        assert_eq!(
            render_in_filter("userId", &[json!("a"), json!("b")], &mut ctx),
            "#f0 IN (:v0, :v1)"
        );
    }

    #[test]
    fn test_group_rendering() {
        let conditions = vec![
            cond("a", Operator::Eq, json!(1), Connector::And),
            cond("b", Operator::Lt, json!(2), Connector::And),
            cond("c", Operator::Eq, json!(3), Connector::Or),
            cond("d", Operator::Eq, json!(4), Connector::Or),
        ];
        let mut ctx = ExpressionContext::new();
        assert_eq!(
            render_filter_groups(&conditions, &mut ctx).unwrap(),
            "(#f0 = :v0 AND #f1 < :v1) AND (#f2 = :v2 OR #f3 = :v3)"
        );
    }
}
