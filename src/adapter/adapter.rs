//! CRUD facade over planner, executor and store

use std::sync::Arc;

use tracing::debug;

use super::scope::Transaction;
use crate::catalog::{KeySchema, SchemaResolver};
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::executor::QueryExecutor;
use crate::fetch::with_retry;
use crate::loader::{BatchLoader, FlushScheduler};
use crate::observability::OperationStats;
use crate::planner::{Condition, FindQuery, QueryPlan, QueryPlanner};
use crate::store::{DeleteItemRequest, PutItemRequest, StoreClient, UpdateItemRequest};
use crate::update::build_update;
use crate::value::Item;

/// Entry point for reads and writes against one store.
///
/// Cheap to share: the client, schema and stats are reference counted and
/// every operation borrows them for its own duration only.
pub struct Adapter {
    client: Arc<dyn StoreClient>,
    schema: Arc<dyn SchemaResolver>,
    config: AdapterConfig,
    stats: Arc<OperationStats>,
}

impl Adapter {
    /// Creates an adapter with the default configuration
    pub fn new(client: Arc<dyn StoreClient>, schema: Arc<dyn SchemaResolver>) -> Self {
        Self {
            client,
            schema,
            config: AdapterConfig::default(),
            stats: Arc::new(OperationStats::new()),
        }
    }

    /// Creates an adapter after validating `config`
    pub fn with_config(
        client: Arc<dyn StoreClient>,
        schema: Arc<dyn SchemaResolver>,
        config: AdapterConfig,
    ) -> AdapterResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            schema,
            config,
            stats: Arc::new(OperationStats::new()),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    pub(crate) fn schema(&self) -> &dyn SchemaResolver {
        self.schema.as_ref()
    }

    pub(crate) fn client(&self) -> &dyn StoreClient {
        self.client.as_ref()
    }

    /// Plans a query without touching the store
    pub fn plan(&self, query: &FindQuery) -> AdapterResult<QueryPlan> {
        QueryPlanner::new(self.schema.as_ref(), &self.config).plan(query)
    }

    pub async fn find_many(&self, query: &FindQuery) -> AdapterResult<Vec<Item>> {
        let plan = self.plan(query)?;
        self.executor().execute(&plan).await
    }

    pub async fn find_one(&self, query: &FindQuery) -> AdapterResult<Option<Item>> {
        let query = query.clone().with_limit(1);
        Ok(self.find_many(&query).await?.into_iter().next())
    }

    pub async fn count(&self, query: &FindQuery) -> AdapterResult<usize> {
        let plan = self.plan(query)?;
        self.executor().count(&plan).await
    }

    /// Stores a new row and returns it with physical attribute names.
    pub async fn create(&self, model: &str, data: Item) -> AdapterResult<Item> {
        let table = self.schema.table_name(model)?;
        let item = physical_item(self.schema.as_ref(), model, data);
        let key_schema = self.schema.primary_key(model)?;
        key_of(model, &key_schema, &item)?;

        let request = PutItemRequest {
            table,
            item: item.clone(),
        };
        with_retry(&self.config.retry, &self.stats, "put_item", || {
            self.client.put_item(request.clone())
        })
        .await?;
        self.stats.increment_writes();
        debug!(model, "item created");
        Ok(item)
    }

    /// Applies `patch` to the first row matching `conditions`.
    ///
    /// The current row is read, merged with the patch and diffed; the store
    /// receives one update expression. Key attributes in the patch are
    /// ignored. Returns `None` when nothing matches.
    pub async fn update(
        &self,
        model: &str,
        conditions: Vec<Condition>,
        patch: Item,
    ) -> AdapterResult<Option<Item>> {
        let query = FindQuery {
            conditions,
            ..FindQuery::new(model)
        };
        let Some(current) = self.find_one(&query).await? else {
            return Ok(None);
        };

        let table = self.schema.table_name(model)?;
        let key_schema = self.schema.primary_key(model)?;
        let key = key_of(model, &key_schema, &current)?;
        let next = merge_patch(self.schema.as_ref(), model, &key_schema, &current, patch);
        let diff = build_update(&current, &next)?;

        let request = UpdateItemRequest {
            table,
            key,
            update_expression: diff.expression,
            attributes: diff.attributes,
            return_updated: true,
        };
        let updated = with_retry(&self.config.retry, &self.stats, "update_item", || {
            self.client.update_item(request.clone())
        })
        .await?;
        self.stats.increment_writes();
        debug!(model, "item updated");
        Ok(Some(updated.unwrap_or(next)))
    }

    /// Deletes every row matching `conditions` and returns how many.
    pub async fn delete(&self, model: &str, conditions: Vec<Condition>) -> AdapterResult<usize> {
        let query = FindQuery {
            conditions,
            ..FindQuery::new(model)
        };
        let rows = self.find_many(&query).await?;
        let table = self.schema.table_name(model)?;
        let key_schema = self.schema.primary_key(model)?;

        for row in &rows {
            let request = DeleteItemRequest {
                table: table.clone(),
                key: key_of(model, &key_schema, row)?,
            };
            with_retry(&self.config.retry, &self.stats, "delete_item", || {
                self.client.delete_item(request.clone())
            })
            .await?;
            self.stats.increment_writes();
        }
        debug!(model, deleted = rows.len(), "items deleted");
        Ok(rows.len())
    }

    /// Loader sharing this adapter's client, schema and stats
    pub fn loader(&self, scheduler: Box<dyn FlushScheduler>) -> BatchLoader {
        BatchLoader::new(
            Arc::clone(&self.client),
            Arc::clone(&self.schema),
            self.config.clone(),
            Arc::clone(&self.stats),
            scheduler,
        )
    }

    /// Opens a buffered transaction
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(self.client.as_ref(), &self.config, &self.stats)
    }
}

/// Renames logical fields of caller data to physical attributes
pub(crate) fn physical_item(schema: &dyn SchemaResolver, model: &str, data: Item) -> Item {
    data.into_iter()
        .map(|(field, value)| (schema.field_name(model, &field), value))
        .collect()
}

/// Primary key attributes of a row
pub(crate) fn key_of(model: &str, key_schema: &KeySchema, item: &Item) -> AdapterResult<Item> {
    let mut key = Item::new();
    let attributes = std::iter::once(&key_schema.partition_key).chain(key_schema.sort_key.as_ref());
    for attribute in attributes {
        match item.get(attribute) {
            Some(value) if !value.is_null() => {
                key.insert(attribute.clone(), value.clone());
            }
            _ => {
                return Err(AdapterError::missing_plan_input(format!(
                    "Row of model '{}' has no value for key attribute '{}'",
                    model, attribute
                )))
            }
        }
    }
    Ok(key)
}

/// `current` with `patch` applied on top; key attributes keep their value.
pub(crate) fn merge_patch(
    schema: &dyn SchemaResolver,
    model: &str,
    key_schema: &KeySchema,
    current: &Item,
    patch: Item,
) -> Item {
    let mut next = current.clone();
    for (field, value) in physical_item(schema, model, patch) {
        if field == key_schema.partition_key || key_schema.sort_key.as_ref() == Some(&field) {
            continue;
        }
        next.insert(field, value);
    }
    next
}
