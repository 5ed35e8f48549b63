//! Request-coalescing primary-key loader

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::scheduler::FlushScheduler;
use crate::catalog::{KeySchema, SchemaResolver};
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::fetch::Fetcher;
use crate::observability::OperationStats;
use crate::store::{StoreClient, StoreError};
use crate::value::{canonical_key, Item};

type Waiter = oneshot::Sender<AdapterResult<Option<Item>>>;

/// Keys waiting for the next flush of one model
#[derive(Default)]
struct PendingBatch {
    /// First-seen order of distinct keys
    order: Vec<(String, Item)>,
    waiters: HashMap<String, Vec<Waiter>>,
}

/// Coalesces primary-key loads into batched fetches.
///
/// Loads for the same model issued before the scheduler's tick completes
/// share one batch-get. Identical keys share one entry and every waiter
/// receives the same row.
pub struct BatchLoader {
    client: Arc<dyn StoreClient>,
    schema: Arc<dyn SchemaResolver>,
    config: AdapterConfig,
    stats: Arc<OperationStats>,
    scheduler: Box<dyn FlushScheduler>,
    pending: Mutex<HashMap<String, PendingBatch>>,
}

impl BatchLoader {
    pub fn new(
        client: Arc<dyn StoreClient>,
        schema: Arc<dyn SchemaResolver>,
        config: AdapterConfig,
        stats: Arc<OperationStats>,
        scheduler: Box<dyn FlushScheduler>,
    ) -> Self {
        Self {
            client,
            schema,
            config,
            stats,
            scheduler,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Loads one row by its full primary key.
    ///
    /// Attributes of `key` outside the model's key schema are ignored.
    pub async fn load(&self, model: &str, key: Item) -> AdapterResult<Option<Item>> {
        let key_schema = self.schema.primary_key(model)?;
        self.schema.table_name(model)?;
        let key = project_key(model, &key_schema, &key)?;
        let receiver = self.register(model, key);

        if let Some(tick) = self.scheduler.tick() {
            tick.await;
            self.dispatch(model).await;
        }

        receiver.await.unwrap_or_else(|_| {
            Err(AdapterError::store(StoreError::Transport(
                "Loader dropped before the batch was fetched".to_string(),
            )))
        })
    }

    /// Loads one row of a model whose key is a single partition attribute.
    pub async fn load_by_id(&self, model: &str, id: Value) -> AdapterResult<Option<Item>> {
        let key_schema = self.schema.primary_key(model)?;
        let mut key = Item::new();
        key.insert(key_schema.partition_key, id);
        self.load(model, key).await
    }

    /// Dispatches everything pending, model by model.
    pub async fn flush(&self) {
        let models: Vec<String> = self.lock().keys().cloned().collect();
        for model in models {
            self.dispatch(&model).await;
        }
    }

    /// Number of distinct keys waiting for a flush
    pub fn pending_keys(&self) -> usize {
        self.lock().values().map(|batch| batch.order.len()).sum()
    }

    fn register(&self, model: &str, key: Item) -> oneshot::Receiver<AdapterResult<Option<Item>>> {
        let (sender, receiver) = oneshot::channel();
        let canonical = canonical_key(&Value::Object(key.clone()));

        let mut pending = self.lock();
        let batch = pending.entry(model.to_string()).or_default();
        let waiters = batch.waiters.entry(canonical.clone()).or_default();
        if waiters.is_empty() {
            batch.order.push((canonical, key));
        }
        waiters.push(sender);
        receiver
    }

    async fn dispatch(&self, model: &str) {
        // Whoever takes the batch first sends it; later callers find nothing.
        let Some(batch) = self.lock().remove(model) else {
            return;
        };

        debug!(model, keys = batch.order.len(), "loader flush");
        let result = self.fetch(model, &batch).await;
        self.stats.increment_loader_flushes();

        let PendingBatch { waiters, .. } = batch;
        match result {
            Ok(mut found) => {
                for (canonical, senders) in waiters {
                    let row = found.remove(&canonical);
                    for sender in senders {
                        let _ = sender.send(Ok(row.clone()));
                    }
                }
            }
            Err(err) => {
                for sender in waiters.into_values().flatten() {
                    let _ = sender.send(Err(err.clone()));
                }
            }
        }
    }

    async fn fetch(&self, model: &str, batch: &PendingBatch) -> AdapterResult<HashMap<String, Item>> {
        let table = self.schema.table_name(model)?;
        let key_schema = self.schema.primary_key(model)?;
        let keys = batch.order.iter().map(|(_, key)| key.clone()).collect();

        let fetcher = Fetcher::new(self.client.as_ref(), &self.config, &self.stats);
        let items = fetcher.batch_get(&table, keys).await?;

        let mut found = HashMap::with_capacity(items.len());
        for item in items {
            if let Ok(key) = project_key(model, &key_schema, &item) {
                found.insert(canonical_key(&Value::Object(key)), item);
            }
        }
        Ok(found)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Restricts `source` to the key schema's attributes.
fn project_key(model: &str, schema: &KeySchema, source: &Item) -> AdapterResult<Item> {
    let mut key = Item::new();
    let attributes = std::iter::once(&schema.partition_key).chain(schema.sort_key.as_ref());
    for attribute in attributes {
        match source.get(attribute) {
            Some(value) if !value.is_null() => {
                key.insert(attribute.clone(), value.clone());
            }
            _ => {
                return Err(AdapterError::missing_plan_input(format!(
                    "Key for model '{}' is missing attribute '{}'",
                    model, attribute
                )))
            }
        }
    }
    Ok(key)
}
