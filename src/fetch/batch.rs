//! Batch-get with chunking and unprocessed-key backoff

use std::collections::HashSet;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::retry::with_retry;
use super::Fetcher;
use crate::errors::{AdapterError, AdapterResult};
use crate::store::{BatchGetRequest, MAX_BATCH_GET_KEYS};
use crate::value::{canonical_key, Item};

impl<'a> Fetcher<'a> {
    /// Fetches items by full primary key.
    ///
    /// Keys are deduplicated and sent in chunks of at most 100. Keys the
    /// store leaves unprocessed are resent with backoff until the retry
    /// budget runs out. An empty key list sends nothing. Result order is
    /// not guaranteed.
    pub async fn batch_get(&self, table: &str, keys: Vec<Item>) -> AdapterResult<Vec<Item>> {
        let mut seen = HashSet::new();
        let keys: Vec<Item> = keys
            .into_iter()
            .filter(|key| seen.insert(canonical_key(&Value::Object(key.clone()))))
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut items = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_BATCH_GET_KEYS) {
            self.batch_get_chunk(table, chunk.to_vec(), &mut items)
                .await?;
        }

        debug!(table, keys = keys.len(), found = items.len(), "batch get complete");
        Ok(items)
    }

    async fn batch_get_chunk(
        &self,
        table: &str,
        mut pending: Vec<Item>,
        items: &mut Vec<Item>,
    ) -> AdapterResult<()> {
        let retry = &self.config.retry;
        let mut round = 0u32;

        loop {
            let request = BatchGetRequest {
                table: table.to_string(),
                keys: std::mem::take(&mut pending),
            };
            let output = with_retry(retry, self.stats, "batch_get", || {
                self.stats.increment_batch_get_requests();
                self.client.batch_get(request.clone())
            })
            .await?;
            items.extend(output.items);

            if output.unprocessed_keys.is_empty() {
                return Ok(());
            }
            round += 1;
            if round >= retry.max_attempts {
                return Err(AdapterError::batch_get_unprocessed(
                    output.unprocessed_keys.len(),
                    round,
                ));
            }

            let delay = retry.delay_for(round - 1);
            warn!(
                table,
                unprocessed = output.unprocessed_keys.len(),
                round,
                delay_ms = delay.as_millis() as u64,
                "batch get left keys unprocessed, retrying"
            );
            self.stats.increment_unprocessed_retries();
            sleep(delay).await;
            pending = output.unprocessed_keys;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KeySchema;
    use crate::config::{AdapterConfig, RetryConfig};
    use crate::errors::AdapterErrorCode;
    use crate::observability::OperationStats;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn key(id: i64) -> Item {
        let mut key = Item::new();
        key.insert("id".into(), json!(id));
        key
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("users", KeySchema::hash("id"), Vec::new());
        store.seed("users", (0..300).map(|i| json!({"id": i, "name": format!("u{}", i)})));
        store
    }

    fn config(attempts: u32) -> AdapterConfig {
        AdapterConfig {
            retry: RetryConfig::immediate(attempts),
            ..AdapterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_chunks_by_one_hundred() {
        let store = store();
        let config = config(3);
        let stats = OperationStats::new();
        let fetcher = Fetcher::new(&store, &config, &stats);

        let items = fetcher
            .batch_get("users", (0..250).map(key).collect())
            .await
            .unwrap();
        assert_eq!(items.len(), 250);

        let sizes: Vec<usize> = store
            .batch_get_requests()
            .iter()
            .map(|r| r.keys.len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_empty_key_list_sends_nothing() {
        let store = store();
        let config = config(3);
        let stats = OperationStats::new();
        let fetcher = Fetcher::new(&store, &config, &stats);

        assert!(fetcher.batch_get("users", Vec::new()).await.unwrap().is_empty());
        assert!(store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_keys_sent_once() {
        let store = store();
        let config = config(3);
        let stats = OperationStats::new();
        let fetcher = Fetcher::new(&store, &config, &stats);

        let items = fetcher
            .batch_get("users", vec![key(1), key(2), key(1)])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(store.batch_get_requests()[0].keys.len(), 2);
    }

    #[tokio::test]
    async fn test_unprocessed_keys_are_retried() {
        let store = store();
        store.leave_unprocessed(2);
        let config = config(5);
        let stats = OperationStats::new();
        let fetcher = Fetcher::new(&store, &config, &stats);

        let items = fetcher
            .batch_get("users", vec![key(1), key(2)])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(store.batch_get_requests().len(), 3);
        assert_eq!(stats.snapshot().unprocessed_retries, 2);
    }

    #[tokio::test]
    async fn test_unprocessed_keys_exhaust_budget() {
        let store = store();
        store.leave_unprocessed(10);
        let config = config(3);
        let stats = OperationStats::new();
        let fetcher = Fetcher::new(&store, &config, &stats);

        let err = fetcher
            .batch_get("users", vec![key(1), key(2)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::BatchGetUnprocessed);
        assert_eq!(store.batch_get_requests().len(), 3);
    }
}
