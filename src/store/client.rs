//! Store request/response shapes and the client trait

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::StoreError;
use crate::value::{values_equal, Item};

/// Maximum keys the store accepts in one batch get
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Maximum operations the store accepts in one atomic multi-write
pub const MAX_TRANSACTION_ITEMS: usize = 25;

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Placeholder tables shared by every expression of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionAttributes {
    /// `#fN` → attribute name
    pub names: BTreeMap<String, String>,
    /// `:vN` → literal value
    pub values: BTreeMap<String, Value>,
}

impl ExpressionAttributes {
    /// Returns true when no placeholder was allocated
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.values.is_empty()
    }
}

/// Point or range query against the table or one of its indexes
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    pub index_name: Option<String>,
    pub key_condition: String,
    pub filter_expression: Option<String>,
    pub attributes: ExpressionAttributes,
    /// Items to evaluate in this page
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
    /// Ascending sort-key order when true
    pub scan_forward: bool,
    /// Return only a count
    pub count_only: bool,
}

/// Full table scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub filter_expression: Option<String>,
    pub attributes: ExpressionAttributes,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
    pub count_only: bool,
}

/// One page of a query or scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Matching items in this page (equals `items.len()` unless counting)
    pub count: usize,
    /// Continuation token; `None` when exhausted
    pub last_evaluated_key: Option<Item>,
}

/// Multi-key fetch by primary key
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGetRequest {
    pub table: String,
    pub keys: Vec<Item>,
}

/// Result of a batch get
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    pub items: Vec<Item>,
    /// Keys the store did not get to; the caller must resend them
    pub unprocessed_keys: Vec<Item>,
}

/// One operation of an atomic multi-write
#[derive(Debug, Clone, PartialEq)]
pub enum TransactWriteItem {
    Put {
        table: String,
        item: Item,
    },
    Update {
        table: String,
        key: Item,
        update_expression: String,
        attributes: ExpressionAttributes,
    },
    Delete {
        table: String,
        key: Item,
    },
}

impl TransactWriteItem {
    /// Table the operation targets
    pub fn table(&self) -> &str {
        match self {
            TransactWriteItem::Put { table, .. }
            | TransactWriteItem::Update { table, .. }
            | TransactWriteItem::Delete { table, .. } => table,
        }
    }

    /// Whether the operation writes the row whose primary key is `key`
    pub fn targets(&self, key: &Item) -> bool {
        let row = match self {
            TransactWriteItem::Put { item, .. } => item,
            TransactWriteItem::Update { key: k, .. } | TransactWriteItem::Delete { key: k, .. } => k,
        };
        key.iter()
            .all(|(attr, v)| row.get(attr).map_or(false, |x| values_equal(x, v)))
    }
}

/// All-or-nothing write of up to 25 operations
#[derive(Debug, Clone, PartialEq)]
pub struct TransactWriteRequest {
    pub items: Vec<TransactWriteItem>,
    /// Idempotency token
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutItemRequest {
    pub table: String,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemRequest {
    pub table: String,
    pub key: Item,
    pub update_expression: String,
    pub attributes: ExpressionAttributes,
    /// Ask the store to return the item after the update
    pub return_updated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteItemRequest {
    pub table: String,
    pub key: Item,
}

/// Client for the underlying store
pub trait StoreClient: Send + Sync {
    fn query(&self, request: QueryRequest) -> StoreFuture<'_, Page>;

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page>;

    fn batch_get(&self, request: BatchGetRequest) -> StoreFuture<'_, BatchGetOutput>;

    fn transact_write(&self, request: TransactWriteRequest) -> StoreFuture<'_, ()>;

    fn put_item(&self, request: PutItemRequest) -> StoreFuture<'_, ()>;

    /// Returns the updated item when `return_updated` is set
    fn update_item(&self, request: UpdateItemRequest) -> StoreFuture<'_, Option<Item>>;

    fn delete_item(&self, request: DeleteItemRequest) -> StoreFuture<'_, ()>;
}

impl<T: StoreClient + ?Sized> StoreClient for Arc<T> {
    fn query(&self, request: QueryRequest) -> StoreFuture<'_, Page> {
        (**self).query(request)
    }

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Page> {
        (**self).scan(request)
    }

    fn batch_get(&self, request: BatchGetRequest) -> StoreFuture<'_, BatchGetOutput> {
        (**self).batch_get(request)
    }

    fn transact_write(&self, request: TransactWriteRequest) -> StoreFuture<'_, ()> {
        (**self).transact_write(request)
    }

    fn put_item(&self, request: PutItemRequest) -> StoreFuture<'_, ()> {
        (**self).put_item(request)
    }

    fn update_item(&self, request: UpdateItemRequest) -> StoreFuture<'_, Option<Item>> {
        (**self).update_item(request)
    }

    fn delete_item(&self, request: DeleteItemRequest) -> StoreFuture<'_, ()> {
        (**self).delete_item(request)
    }
}
