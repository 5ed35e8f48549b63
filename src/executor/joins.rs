//! Join resolution
//!
//! Each edge collects the distinct local values of the base rows, fetches
//! matching target rows with the edge's strategy, groups them by the
//! foreign field and attaches them under the edge alias.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::errors::AdapterResult;
use crate::fetch::Fetcher;
use crate::planner::{
    partition_condition, render_in_filter, ExecutionStrategy, ExpressionContext, Relation,
    ResolvedJoin, MAX_IN_OPERANDS,
};
use crate::store::{QueryRequest, ScanRequest};
use crate::value::{canonical_key, is_missing, Item};

/// Attaches joined rows to base rows
pub struct JoinResolver<'f, 'a> {
    fetcher: &'f Fetcher<'a>,
}

impl<'f, 'a> JoinResolver<'f, 'a> {
    pub fn new(fetcher: &'f Fetcher<'a>) -> Self {
        Self { fetcher }
    }

    /// Resolves one edge for every row.
    ///
    /// Rows without a local value get `null` (one-to-one) or `[]`
    /// (one-to-many). When no row has a value nothing is fetched.
    pub async fn attach(
        &self,
        rows: &mut [Item],
        join: &ResolvedJoin,
        strategy: &ExecutionStrategy,
    ) -> AdapterResult<()> {
        let values = distinct_local_values(rows, &join.local_field);
        if values.is_empty() {
            for row in rows.iter_mut() {
                row.insert(join.alias.clone(), empty_attachment(join.relation));
            }
            return Ok(());
        }

        let strategy = strategy.clone().for_join_values(values.len(), &join.key_schema);
        debug!(
            target_model = join.target_model.as_str(),
            strategy = strategy.as_str(),
            values = values.len(),
            "resolving join"
        );
        let fetched = self.fetch(join, &strategy, &values).await?;

        let mut groups: HashMap<String, Vec<Item>> = HashMap::new();
        for item in fetched {
            if let Some(value) = item.get(&join.foreign_field).filter(|v| !v.is_null()) {
                groups.entry(canonical_key(value)).or_default().push(item);
            }
        }

        for row in rows.iter_mut() {
            let matches = row
                .get(&join.local_field)
                .filter(|v| !v.is_null())
                .and_then(|v| groups.get(&canonical_key(v)));
            let attachment = match (join.relation, matches) {
                (_, None) => empty_attachment(join.relation),
                (Relation::OneToOne, Some(found)) => found
                    .first()
                    .cloned()
                    .map(Value::Object)
                    .unwrap_or(Value::Null),
                (Relation::OneToMany, Some(found)) => Value::Array(
                    found
                        .iter()
                        .take(join.cap)
                        .cloned()
                        .map(Value::Object)
                        .collect(),
                ),
            };
            row.insert(join.alias.clone(), attachment);
        }
        Ok(())
    }

    async fn fetch(
        &self,
        join: &ResolvedJoin,
        strategy: &ExecutionStrategy,
        values: &[Value],
    ) -> AdapterResult<Vec<Item>> {
        match strategy {
            ExecutionStrategy::BatchGet => {
                let keys = values
                    .iter()
                    .map(|v| {
                        let mut key = Item::new();
                        key.insert(join.foreign_field.clone(), v.clone());
                        key
                    })
                    .collect();
                self.fetcher.batch_get(&join.table, keys).await
            }
            ExecutionStrategy::PrimaryKeyQuery => self.query_each(join, None, values).await,
            ExecutionStrategy::SecondaryIndexQuery { index_name }
            | ExecutionStrategy::MultiQuery { index_name, .. } => {
                self.query_each(join, Some(index_name), values).await
            }
            ExecutionStrategy::Scan => {
                let mut items = Vec::new();
                for chunk in values.chunks(MAX_IN_OPERANDS) {
                    let mut ctx = ExpressionContext::new();
                    let filter = render_in_filter(&join.foreign_field, chunk, &mut ctx);
                    let request = ScanRequest {
                        table: join.table.clone(),
                        filter_expression: Some(filter),
                        attributes: ctx.into_attributes(),
                        limit: None,
                        exclusive_start_key: None,
                        count_only: false,
                    };
                    items.extend(self.fetcher.scan(request, None).await?);
                }
                Ok(items)
            }
        }
    }

    /// One query per value, in first-seen order
    async fn query_each(
        &self,
        join: &ResolvedJoin,
        index_name: Option<&String>,
        values: &[Value],
    ) -> AdapterResult<Vec<Item>> {
        let mut items = Vec::new();
        for value in values {
            let mut ctx = ExpressionContext::new();
            let key_condition = partition_condition(&join.foreign_field, value, &mut ctx);
            let request = QueryRequest {
                table: join.table.clone(),
                index_name: index_name.cloned(),
                key_condition,
                filter_expression: None,
                attributes: ctx.into_attributes(),
                limit: None,
                exclusive_start_key: None,
                scan_forward: true,
                count_only: false,
            };
            items.extend(self.fetcher.query(request, Some(join.cap)).await?);
        }
        Ok(items)
    }
}

fn empty_attachment(relation: Relation) -> Value {
    match relation {
        Relation::OneToOne => Value::Null,
        Relation::OneToMany => Value::Array(Vec::new()),
    }
}

/// Distinct non-missing values of `field`, first-seen order
fn distinct_local_values(rows: &[Item], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(field))
        .filter(|v| !is_missing(Some(v)))
        .filter(|v| seen.insert(canonical_key(v)))
        .cloned()
        .collect()
}
