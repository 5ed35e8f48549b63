//! Query executor
//!
//! Runs a [`QueryPlan`] against the store. Execution order is fixed:
//!
//! 1. Fetch with the base strategy
//! 2. In-memory filter (when directed)
//! 3. In-memory sort (when directed)
//! 4. Offset and limit
//! 5. Projection (selected fields plus join local keys)
//! 6. Joins, in declaration order

use std::collections::HashMap;

use tracing::debug;

use super::filters::PredicateFilter;
use super::joins::JoinResolver;
use super::projection::Projection;
use super::sorter::ResultSorter;
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::fetch::Fetcher;
use crate::observability::OperationStats;
use crate::planner::{
    build_filter_expression, build_key_condition, distinct_values, partition_condition,
    ExecutionStrategy, ExpressionContext, NormalizedCondition, QueryPlan, SortDirection,
};
use crate::store::{QueryRequest, ScanRequest, StoreClient};
use crate::value::{canonical_key, Item};

/// Executes plans produced by the planner
pub struct QueryExecutor<'a> {
    fetcher: Fetcher<'a>,
    stats: &'a OperationStats,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new executor
    pub fn new(
        client: &'a dyn StoreClient,
        config: &'a AdapterConfig,
        stats: &'a OperationStats,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(client, config, stats),
            stats,
        }
    }

    /// Executes a plan and returns the resulting rows.
    pub async fn execute(&self, plan: &QueryPlan) -> AdapterResult<Vec<Item>> {
        let directives = plan.directives();

        // 1. Fetch
        let mut items = self.fetch_base(plan, directives.fetch_limit).await?;
        let fetched = items.len();

        // 2. Filter
        if directives.requires_client_filter {
            items = PredicateFilter::apply(items, &plan.conditions);
            self.stats.add_rows_filtered((fetched - items.len()) as u64);
        }

        // 3. Sort
        if directives.requires_client_sort {
            if let Some(sort) = &plan.sort {
                ResultSorter::sort(&mut items, sort);
            }
        }

        // 4. Offset and limit
        if plan.offset > 0 || plan.limit.is_some() {
            items = items
                .into_iter()
                .skip(plan.offset)
                .take(plan.limit.unwrap_or(usize::MAX))
                .collect();
        }

        // 5. Projection
        if let Some(select) = &plan.select {
            let join_keys: Vec<&str> = plan.joins.iter().map(|j| j.local_field.as_str()).collect();
            items = Projection::apply(items, select, &join_keys);
        }

        // 6. Joins
        let resolver = JoinResolver::new(&self.fetcher);
        for (join, strategy) in plan.joins.iter().zip(&directives.join_strategies) {
            resolver.attach(&mut items, join, strategy).await?;
        }

        self.stats.increment_finds();
        debug!(
            model = plan.model.as_str(),
            fetched,
            returned = items.len(),
            "find executed"
        );
        Ok(items)
    }

    /// Counts matching rows.
    ///
    /// Uses the store's count mode when every condition can be pushed down;
    /// otherwise fetches and filters in memory.
    pub async fn count(&self, plan: &QueryPlan) -> AdapterResult<usize> {
        let directives = plan.directives();
        let native = !directives.requires_client_filter
            && matches!(
                directives.base_strategy,
                ExecutionStrategy::PrimaryKeyQuery
                    | ExecutionStrategy::SecondaryIndexQuery { .. }
                    | ExecutionStrategy::Scan
            );

        let total = if native {
            match &directives.base_strategy {
                ExecutionStrategy::Scan => self.fetcher.scan_count(self.scan_request(plan)).await?,
                _ => self.fetcher.query_count(self.key_query(plan)?).await?,
            }
        } else {
            let items = self.fetch_base(plan, None).await?;
            if directives.requires_client_filter {
                items
                    .iter()
                    .filter(|item| PredicateFilter::matches(item, &plan.conditions))
                    .count()
            } else {
                items.len()
            }
        };

        self.stats.increment_counts();
        debug!(model = plan.model.as_str(), total, "count executed");
        Ok(total)
    }

    async fn fetch_base(&self, plan: &QueryPlan, limit: Option<usize>) -> AdapterResult<Vec<Item>> {
        match &plan.directives().base_strategy {
            ExecutionStrategy::PrimaryKeyQuery | ExecutionStrategy::SecondaryIndexQuery { .. } => {
                self.fetcher.query(self.key_query(plan)?, limit).await
            }
            ExecutionStrategy::MultiQuery { index_name, field } => {
                self.multi_query(plan, index_name, field, limit).await
            }
            ExecutionStrategy::BatchGet => self.batch_get(plan).await,
            ExecutionStrategy::Scan => self.fetcher.scan(self.scan_request(plan), limit).await,
        }
    }

    /// Query request for a primary-key or secondary-index strategy
    fn key_query(&self, plan: &QueryPlan) -> AdapterResult<QueryRequest> {
        let key = plan
            .key_match()
            .ok_or_else(|| AdapterError::missing_key_condition(&plan.model))?;
        let mut ctx = ExpressionContext::new();
        let key_condition = build_key_condition(key, &plan.conditions, &mut ctx);
        let filter_expression = build_filter_expression(&key_condition.remaining, &mut ctx);

        Ok(QueryRequest {
            table: plan.table.clone(),
            index_name: key_condition.index_name,
            key_condition: key_condition.expression,
            filter_expression,
            attributes: ctx.into_attributes(),
            limit: None,
            exclusive_start_key: None,
            scan_forward: plan.directives().server_side_sort != Some(SortDirection::Desc),
            count_only: false,
        })
    }

    fn scan_request(&self, plan: &QueryPlan) -> ScanRequest {
        let mut ctx = ExpressionContext::new();
        let filter_expression = build_filter_expression(&plan.conditions, &mut ctx);
        ScanRequest {
            table: plan.table.clone(),
            filter_expression,
            attributes: ctx.into_attributes(),
            limit: None,
            exclusive_start_key: None,
            count_only: false,
        }
    }

    /// One index query per distinct value, results concatenated in value order
    async fn multi_query(
        &self,
        plan: &QueryPlan,
        index_name: &str,
        field: &str,
        limit: Option<usize>,
    ) -> AdapterResult<Vec<Item>> {
        let (membership, remaining) = split_membership(&plan.conditions, field)
            .ok_or_else(|| AdapterError::missing_key_condition(&plan.model))?;

        let mut items = Vec::new();
        for value in distinct_values(&membership.value) {
            let budget = match limit {
                Some(limit) if items.len() >= limit => break,
                Some(limit) => Some(limit - items.len()),
                None => None,
            };
            let mut ctx = ExpressionContext::new();
            let key_condition = partition_condition(field, &value, &mut ctx);
            let filter_expression = build_filter_expression(&remaining, &mut ctx);
            let request = QueryRequest {
                table: plan.table.clone(),
                index_name: Some(index_name.to_string()),
                key_condition,
                filter_expression,
                attributes: ctx.into_attributes(),
                limit: None,
                exclusive_start_key: None,
                scan_forward: true,
                count_only: false,
            };
            items.extend(self.fetcher.query(request, budget).await?);
        }
        Ok(items)
    }

    /// Batch get on the partition key; rows come back in key order
    async fn batch_get(&self, plan: &QueryPlan) -> AdapterResult<Vec<Item>> {
        let pk = plan.key_schema.partition_key.as_str();
        let (membership, _) = split_membership(&plan.conditions, pk)
            .ok_or_else(|| AdapterError::missing_key_condition(&plan.model))?;

        let values = distinct_values(&membership.value);
        let order: HashMap<String, usize> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (canonical_key(v), i))
            .collect();
        let keys = values
            .into_iter()
            .map(|v| {
                let mut key = Item::new();
                key.insert(pk.to_string(), v);
                key
            })
            .collect();

        let mut items = self.fetcher.batch_get(&plan.table, keys).await?;
        items.sort_by_key(|item| {
            item.get(pk)
                .and_then(|v| order.get(&canonical_key(v)).copied())
                .unwrap_or(usize::MAX)
        });
        Ok(items)
    }
}

/// Splits out the first `AND`-connected `in` condition on `field`
fn split_membership(
    conditions: &[NormalizedCondition],
    field: &str,
) -> Option<(NormalizedCondition, Vec<NormalizedCondition>)> {
    let position = conditions
        .iter()
        .position(|c| c.is_key_membership() && c.field == field && c.value.is_array())?;
    let remaining = conditions
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, c)| c.clone())
        .collect();
    Some((conditions[position].clone(), remaining))
}
