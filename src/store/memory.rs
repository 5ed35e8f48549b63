//! In-memory store
//!
//! A single-process implementation of [`StoreClient`] for tests and local
//! development. Tables hold items in insertion order; queries return items
//! ordered by the sort key of the table or index being queried. Every
//! request is recorded, and failures can be scripted per operation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::client::{
    BatchGetOutput, BatchGetRequest, DeleteItemRequest, ExpressionAttributes, Page,
    PutItemRequest, QueryRequest, ScanRequest, StoreClient, StoreFuture, TransactWriteItem,
    TransactWriteRequest, UpdateItemRequest, MAX_BATCH_GET_KEYS, MAX_TRANSACTION_ITEMS,
};
use super::errors::StoreError;
use super::expression::{apply_update, parse_condition};
use crate::catalog::{KeySchema, StaticSchema};
use crate::value::{canonical_key, compare_values, values_equal, Item};

/// A request as seen by the store
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Query(QueryRequest),
    Scan(ScanRequest),
    BatchGet(BatchGetRequest),
    TransactWrite(TransactWriteRequest),
    Put(PutItemRequest),
    Update(UpdateItemRequest),
    Delete(DeleteItemRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Query,
    Scan,
    BatchGet,
    TransactWrite,
    Write,
}

impl RecordedRequest {
    fn kind(&self) -> OpKind {
        match self {
            RecordedRequest::Query(_) => OpKind::Query,
            RecordedRequest::Scan(_) => OpKind::Scan,
            RecordedRequest::BatchGet(_) => OpKind::BatchGet,
            RecordedRequest::TransactWrite(_) => OpKind::TransactWrite,
            _ => OpKind::Write,
        }
    }
}

#[derive(Debug, Clone)]
struct Table {
    key: KeySchema,
    indexes: HashMap<String, KeySchema>,
    items: Vec<Item>,
}

impl Table {
    fn key_of(&self, item: &Item) -> Item {
        let mut key = Item::new();
        for attr in std::iter::once(&self.key.partition_key).chain(self.key.sort_key.iter()) {
            if let Some(v) = item.get(attr) {
                key.insert(attr.clone(), v.clone());
            }
        }
        key
    }

    fn position(&self, key: &Item) -> Option<usize> {
        self.items.iter().position(|item| {
            key.iter()
                .all(|(k, v)| item.get(k).map(|x| values_equal(x, v)).unwrap_or(false))
        })
    }

    fn upsert(&mut self, item: Item) {
        let key = self.key_of(&item);
        match self.position(&key) {
            Some(pos) => self.items[pos] = item,
            None => self.items.push(item),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    requests: Vec<RecordedRequest>,
    failures: VecDeque<(OpKind, StoreError)>,
    unprocessed_rounds: usize,
}

/// In-memory [`StoreClient`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store with unbounded pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates tables for every model of a schema
    pub fn from_schema(schema: &StaticSchema) -> Self {
        let store = Self::new();
        for model in schema.models() {
            store.create_table(
                &model.table,
                model.primary_key.clone(),
                model
                    .indexes
                    .iter()
                    .map(|idx| (idx.name.clone(), idx.keys.clone())),
            );
        }
        store
    }

    /// Caps every query/scan page at `size` evaluated items
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Creates (or replaces) a table
    pub fn create_table(
        &self,
        name: &str,
        key: KeySchema,
        indexes: impl IntoIterator<Item = (String, KeySchema)>,
    ) {
        let mut state = self.lock();
        let table = state.tables.entry(name.to_string()).or_insert_with(|| Table {
            key: key.clone(),
            indexes: HashMap::new(),
            items: Vec::new(),
        });
        table.key = key;
        table.indexes = indexes.into_iter().collect();
    }

    /// Inserts items directly, bypassing request recording
    pub fn seed(&self, table: &str, items: impl IntoIterator<Item = Value>) {
        let mut state = self.lock();
        if let Some(t) = state.tables.get_mut(table) {
            for item in items {
                if let Value::Object(map) = item {
                    t.upsert(map);
                }
            }
        }
    }

    /// Snapshot of a table's items in storage order
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.items.clone())
            .unwrap_or_default()
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Batch get requests received so far
    pub fn batch_get_requests(&self) -> Vec<BatchGetRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::BatchGet(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Query requests received so far
    pub fn query_requests(&self) -> Vec<QueryRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::Query(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    /// Scan requests received so far
    pub fn scan_requests(&self) -> Vec<ScanRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::Scan(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded requests
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Fails the next query with `err`
    pub fn fail_next_query(&self, err: StoreError) {
        self.lock().failures.push_back((OpKind::Query, err));
    }

    /// Fails the next scan with `err`
    pub fn fail_next_scan(&self, err: StoreError) {
        self.lock().failures.push_back((OpKind::Scan, err));
    }

    /// Fails the next batch get with `err`
    pub fn fail_next_batch_get(&self, err: StoreError) {
        self.lock().failures.push_back((OpKind::BatchGet, err));
    }

    /// Fails the next transaction with `err`
    pub fn fail_next_transaction(&self, err: StoreError) {
        self.lock().failures.push_back((OpKind::TransactWrite, err));
    }

    /// The next `rounds` batch gets return every requested key as unprocessed
    pub fn leave_unprocessed(&self, rounds: usize) {
        self.lock().unprocessed_rounds = rounds;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-request.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, request: RecordedRequest) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        let mut state = self.lock();
        let kind = request.kind();
        state.requests.push(request);
        if let Some(pos) = state.failures.iter().position(|(k, _)| *k == kind) {
            if let Some((_, err)) = state.failures.remove(pos) {
                return Err(err);
            }
        }
        Ok(state)
    }

    fn table<'s>(state: &'s State, name: &str) -> Result<&'s Table, StoreError> {
        state
            .tables
            .get(name)
            .ok_or_else(|| StoreError::service("ResourceNotFoundException", format!("Table '{}' not found", name)))
    }

    fn table_mut<'s>(state: &'s mut State, name: &str) -> Result<&'s mut Table, StoreError> {
        state
            .tables
            .get_mut(name)
            .ok_or_else(|| StoreError::service("ResourceNotFoundException", format!("Table '{}' not found", name)))
    }

    /// Shared page cut for query and scan.
    fn page(
        &self,
        table: &Table,
        candidates: Vec<&Item>,
        filter: Option<&str>,
        attributes: &ExpressionAttributes,
        limit: Option<usize>,
        start: Option<&Item>,
        count_only: bool,
    ) -> Result<Page, StoreError> {
        let filter = filter
            .map(|f| parse_condition(f, attributes))
            .transpose()?;

        let offset = match start {
            Some(key) => {
                let key = table.key_of(key);
                candidates
                    .iter()
                    .position(|item| table.key_of(item) == key)
                    .map(|p| p + 1)
                    .unwrap_or(candidates.len())
            }
            None => 0,
        };

        let budget = match (limit, self.page_size) {
            (Some(l), Some(p)) => l.min(p),
            (Some(l), None) => l,
            (None, Some(p)) => p,
            (None, None) => usize::MAX,
        };

        let remaining = &candidates[offset..];
        let evaluated = &remaining[..remaining.len().min(budget)];
        let matched: Vec<Item> = evaluated
            .iter()
            .filter(|item| filter.as_ref().map(|f| f.matches(item)).unwrap_or(true))
            .map(|item| (*item).clone())
            .collect();

        let last_evaluated_key = if evaluated.len() < remaining.len() {
            evaluated.last().map(|item| table.key_of(item))
        } else {
            None
        };

        Ok(Page {
            count: matched.len(),
            items: if count_only { Vec::new() } else { matched },
            last_evaluated_key,
        })
    }
}

impl StoreClient for MemoryStore {
    fn query(&self, request: QueryRequest) -> StoreFuture<'_, Page> {
        Box::pin(async move {
            let state = self.begin(RecordedRequest::Query(request.clone()))?;
            let table = Self::table(&state, &request.table)?;
            let sort_key = match &request.index_name {
                Some(index) => table
                    .indexes
                    .get(index)
                    .ok_or_else(|| {
                        StoreError::service(
                            "ValidationException",
                            format!("Index '{}' not found", index),
                        )
                    })?
                    .sort_key
                    .clone(),
                None => table.key.sort_key.clone(),
            };

            let key_condition = parse_condition(&request.key_condition, &request.attributes)?;
            let mut candidates: Vec<&Item> = table
                .items
                .iter()
                .filter(|item| key_condition.matches(item))
                .collect();
            if let Some(sk) = &sort_key {
                candidates.sort_by(|a, b| match (a.get(sk), b.get(sk)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(std::cmp::Ordering::Equal),
                    _ => std::cmp::Ordering::Equal,
                });
            }
            if !request.scan_forward {
                candidates.reverse();
            }

            self.page(
                table,
                candidates,
                request.filter_expression.as_deref(),
                &request.attributes,
                request.limit,
                request.exclusive_start_key.as_ref(),
                request.count_only,
            )
        })
    }

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page> {
        Box::pin(async move {
            let state = self.begin(RecordedRequest::Scan(request.clone()))?;
            let table = Self::table(&state, &request.table)?;
            self.page(
                table,
                table.items.iter().collect(),
                request.filter_expression.as_deref(),
                &request.attributes,
                request.limit,
                request.exclusive_start_key.as_ref(),
                request.count_only,
            )
        })
    }

    fn batch_get(&self, request: BatchGetRequest) -> StoreFuture<'_, BatchGetOutput> {
        Box::pin(async move {
            let mut state = self.begin(RecordedRequest::BatchGet(request.clone()))?;
            if request.keys.len() > MAX_BATCH_GET_KEYS {
                return Err(StoreError::service(
                    "ValidationException",
                    format!("Too many keys: {}", request.keys.len()),
                ));
            }
            if state.unprocessed_rounds > 0 {
                state.unprocessed_rounds -= 1;
                return Ok(BatchGetOutput {
                    items: Vec::new(),
                    unprocessed_keys: request.keys,
                });
            }
            let table = Self::table(&state, &request.table)?;
            let items = request
                .keys
                .iter()
                .filter_map(|key| table.position(key).map(|pos| table.items[pos].clone()))
                .collect();
            Ok(BatchGetOutput {
                items,
                unprocessed_keys: Vec::new(),
            })
        })
    }

    fn transact_write(&self, request: TransactWriteRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.begin(RecordedRequest::TransactWrite(request.clone()))?;
            if request.items.len() > MAX_TRANSACTION_ITEMS {
                return Err(StoreError::service(
                    "ValidationException",
                    format!("Too many transaction items: {}", request.items.len()),
                ));
            }

            // Stage on a copy so a failing operation leaves every table untouched.
            let mut staged = state.tables.clone();
            let mut touched = HashSet::new();
            for op in &request.items {
                let table = staged.get_mut(op.table()).ok_or_else(|| {
                    StoreError::TransactionCanceled(format!("Table '{}' not found", op.table()))
                })?;
                let key = match op {
                    TransactWriteItem::Put { item, .. } => table.key_of(item),
                    TransactWriteItem::Update { key, .. } | TransactWriteItem::Delete { key, .. } => {
                        table.key_of(key)
                    }
                };
                let identity: Vec<String> = key.values().map(canonical_key).collect();
                if !touched.insert((op.table().to_string(), identity)) {
                    return Err(StoreError::service(
                        "ValidationException",
                        "Transaction request cannot include multiple operations on one item",
                    ));
                }
                match op {
                    TransactWriteItem::Put { item, .. } => table.upsert(item.clone()),
                    TransactWriteItem::Update {
                        key,
                        update_expression,
                        attributes,
                        ..
                    } => {
                        let mut item = table
                            .position(key)
                            .map(|pos| table.items[pos].clone())
                            .unwrap_or_else(|| key.clone());
                        apply_update(&mut item, update_expression, attributes)
                            .map_err(|e| StoreError::TransactionCanceled(e.to_string()))?;
                        table.upsert(item);
                    }
                    TransactWriteItem::Delete { key, .. } => {
                        if let Some(pos) = table.position(key) {
                            table.items.remove(pos);
                        }
                    }
                }
            }
            state.tables = staged;
            Ok(())
        })
    }

    fn put_item(&self, request: PutItemRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.begin(RecordedRequest::Put(request.clone()))?;
            Self::table_mut(&mut state, &request.table)?.upsert(request.item);
            Ok(())
        })
    }

    fn update_item(&self, request: UpdateItemRequest) -> StoreFuture<'_, Option<Item>> {
        Box::pin(async move {
            let mut state = self.begin(RecordedRequest::Update(request.clone()))?;
            let table = Self::table_mut(&mut state, &request.table)?;
            let mut item = table
                .position(&request.key)
                .map(|pos| table.items[pos].clone())
                .unwrap_or_else(|| request.key.clone());
            apply_update(&mut item, &request.update_expression, &request.attributes)?;
            table.upsert(item.clone());
            Ok(request.return_updated.then_some(item))
        })
    }

    fn delete_item(&self, request: DeleteItemRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.begin(RecordedRequest::Delete(request.clone()))?;
            let table = Self::table_mut(&mut state, &request.table)?;
            if let Some(pos) = table.position(&request.key) {
                table.items.remove(pos);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new().with_page_size(2);
        store.create_table(
            "sessions",
            KeySchema::hash("id"),
            [("user_idx".to_string(), KeySchema::composite("user_id", "created_at"))],
        );
        store.seed(
            "sessions",
            vec![
                json!({"id": "s1", "user_id": "u1", "created_at": "2024-01-03"}),
                json!({"id": "s2", "user_id": "u2", "created_at": "2024-01-01"}),
                json!({"id": "s3", "user_id": "u1", "created_at": "2024-01-01"}),
                json!({"id": "s4", "user_id": "u1", "created_at": "2024-01-02"}),
            ],
        );
        store
    }

    fn attrs() -> ExpressionAttributes {
        ExpressionAttributes {
            names: [("#f0".to_string(), "user_id".to_string())].into_iter().collect(),
            values: [(":v0".to_string(), json!("u1"))].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_index_query_sorted_and_paged() {
        let store = store();
        let request = QueryRequest {
            table: "sessions".into(),
            index_name: Some("user_idx".into()),
            key_condition: "#f0 = :v0".into(),
            filter_expression: None,
            attributes: attrs(),
            limit: None,
            exclusive_start_key: None,
            scan_forward: true,
            count_only: false,
        };
        let first = store.query(request.clone()).await.unwrap();
        let ids: Vec<_> = first.items.iter().map(|i| i["id"].clone()).collect();
        assert_eq!(ids, vec![json!("s3"), json!("s4")]);
        assert!(first.last_evaluated_key.is_some());

        let second = store
            .query(QueryRequest {
                exclusive_start_key: first.last_evaluated_key,
                ..request
            })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["id"], "s1");
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let store = store();
        store.fail_next_scan(StoreError::service("ThrottlingException", "slow"));
        let request = ScanRequest {
            table: "sessions".into(),
            filter_expression: None,
            attributes: ExpressionAttributes::default(),
            limit: None,
            exclusive_start_key: None,
            count_only: true,
        };
        assert!(store.scan(request.clone()).await.is_err());
        let page = store.scan(request).await.unwrap();
        assert_eq!(page.count, 2);
        assert!(page.items.is_empty());
        assert_eq!(store.scan_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let store = store();
        let request = TransactWriteRequest {
            client_token: "t".into(),
            items: vec![
                TransactWriteItem::Delete {
                    table: "sessions".into(),
                    key: json!({"id": "s1"}).as_object().cloned().unwrap(),
                },
                TransactWriteItem::Put {
                    table: "missing".into(),
                    item: Item::new(),
                },
            ],
        };
        assert!(store.transact_write(request).await.is_err());
        assert_eq!(store.items("sessions").len(), 4);
    }

    #[tokio::test]
    async fn test_transaction_rejects_two_writes_to_one_item() {
        let store = store();
        let request = TransactWriteRequest {
            client_token: "t".into(),
            items: vec![
                TransactWriteItem::Put {
                    table: "sessions".into(),
                    item: json!({"id": "s9", "user_id": "u3"}).as_object().cloned().unwrap(),
                },
                TransactWriteItem::Delete {
                    table: "sessions".into(),
                    key: json!({"id": "s9"}).as_object().cloned().unwrap(),
                },
            ],
        };
        let err = store.transact_write(request).await.unwrap_err();
        assert_eq!(err.code(), Some("ValidationException"));
        assert!(!err.is_retryable());
        assert_eq!(store.items("sessions").len(), 4);
    }
}
