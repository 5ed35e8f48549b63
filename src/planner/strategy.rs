//! Strategy resolution
//!
//! Picks the cheapest access path for a set of normalized conditions, in
//! fixed priority order:
//!
//! 1. `eq` on the table partition key → primary-key query
//! 2. `eq` on an indexed field → secondary-index query (a companion `eq` on
//!    the index sort key scores higher)
//! 3. `in` on an indexed field → one query per distinct value
//! 4. `in` on the partition key of a simple-keyed table → batch get
//! 5. anything else → scan
//!
//! Only `AND`-connected conditions participate.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use super::ast::NormalizedCondition;
use crate::catalog::{KeySchema, SchemaResolver};
use crate::errors::AdapterResult;
use crate::value::canonical_key;

/// Access path for a base query or a join edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    PrimaryKeyQuery,
    SecondaryIndexQuery { index_name: String },
    MultiQuery { index_name: String, field: String },
    BatchGet,
    Scan,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::PrimaryKeyQuery => "primary_key_query",
            ExecutionStrategy::SecondaryIndexQuery { .. } => "secondary_index_query",
            ExecutionStrategy::MultiQuery { .. } => "multi_query",
            ExecutionStrategy::BatchGet => "batch_get",
            ExecutionStrategy::Scan => "scan",
        }
    }

    /// Join upgrade: several distinct values against a primary-key match
    /// on a simple-keyed table become one batch get.
    pub fn for_join_values(self, distinct_values: usize, target_key: &KeySchema) -> Self {
        match self {
            ExecutionStrategy::PrimaryKeyQuery
                if distinct_values > 1 && target_key.is_simple() =>
            {
                ExecutionStrategy::BatchGet
            }
            other => other,
        }
    }
}

/// Conditions chosen to form a key condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    /// `None` for the base table
    pub index_name: Option<String>,
    pub key_schema: KeySchema,
    /// Position of the partition-key equality
    pub partition: usize,
    /// Position of the sort-key equality, if one was found
    pub sort: Option<usize>,
    pub score: u8,
}

/// Resolves strategies against a schema
pub struct StrategyResolver<'a> {
    schema: &'a dyn SchemaResolver,
}

impl<'a> StrategyResolver<'a> {
    pub fn new(schema: &'a dyn SchemaResolver) -> Self {
        Self { schema }
    }

    /// Best primary-key or secondary-index match (steps 1-2)
    pub fn key_match(
        &self,
        model: &str,
        conditions: &[NormalizedCondition],
    ) -> AdapterResult<Option<KeyMatch>> {
        let table_key = self.schema.primary_key(model)?;

        if let Some(partition) = find_equality(conditions, &table_key.partition_key) {
            let sort = table_key
                .sort_key
                .as_deref()
                .and_then(|sk| find_equality(conditions, sk));
            return Ok(Some(KeyMatch {
                index_name: None,
                key_schema: table_key,
                partition,
                sort,
                score: if sort.is_some() { 2 } else { 1 },
            }));
        }

        let mut best: Option<KeyMatch> = None;
        for (position, condition) in conditions.iter().enumerate() {
            if !condition.is_key_equality() {
                continue;
            }
            let Some(index_name) = self.schema.index_name(model, &condition.field) else {
                continue;
            };
            let key_schema = self
                .schema
                .index_key_schema(model, &index_name)
                .unwrap_or_else(|| KeySchema::hash(condition.field.clone()));
            let sort = key_schema
                .sort_key
                .as_deref()
                .and_then(|sk| find_equality(conditions, sk));
            let score = if sort.is_some() { 2 } else { 1 };

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(KeyMatch {
                    index_name: Some(index_name),
                    key_schema,
                    partition: position,
                    sort,
                    score,
                });
            }
        }
        Ok(best)
    }

    /// Strategy for the base query
    pub fn resolve_base(
        &self,
        model: &str,
        conditions: &[NormalizedCondition],
    ) -> AdapterResult<ExecutionStrategy> {
        if let Some(key) = self.key_match(model, conditions)? {
            return Ok(match key.index_name {
                None => ExecutionStrategy::PrimaryKeyQuery,
                Some(index_name) => ExecutionStrategy::SecondaryIndexQuery { index_name },
            });
        }

        let memberships = || {
            conditions
                .iter()
                .filter(|c| c.is_key_membership() && c.value.is_array())
        };

        for condition in memberships() {
            if let Some(index_name) = self.schema.index_name(model, &condition.field) {
                return Ok(ExecutionStrategy::MultiQuery {
                    index_name,
                    field: condition.field.clone(),
                });
            }
        }

        let table_key = self.schema.primary_key(model)?;
        if table_key.is_simple()
            && memberships().any(|c| c.field == table_key.partition_key)
        {
            return Ok(ExecutionStrategy::BatchGet);
        }

        Ok(ExecutionStrategy::Scan)
    }

    /// Strategy for a join edge, before the distinct-value upgrade
    pub fn resolve_join(
        &self,
        target_model: &str,
        foreign_field: &str,
    ) -> AdapterResult<ExecutionStrategy> {
        let table_key = self.schema.primary_key(target_model)?;
        if table_key.partition_key == foreign_field {
            return Ok(ExecutionStrategy::PrimaryKeyQuery);
        }
        Ok(match self.schema.index_name(target_model, foreign_field) {
            Some(index_name) => ExecutionStrategy::SecondaryIndexQuery { index_name },
            None => ExecutionStrategy::Scan,
        })
    }
}

fn find_equality(conditions: &[NormalizedCondition], field: &str) -> Option<usize> {
    conditions
        .iter()
        .position(|c| c.is_key_equality() && c.field == field && !c.value.is_null())
}

/// Distinct values of an `in` list, first-seen order
pub fn distinct_values(value: &Value) -> Vec<Value> {
    let mut seen = HashSet::new();
    match value {
        Value::Array(list) => list
            .iter()
            .filter(|v| seen.insert(canonical_key(v)))
            .cloned()
            .collect(),
        other => vec![other.clone()],
    }
}
