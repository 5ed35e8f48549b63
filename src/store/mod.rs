//! Store boundary
//!
//! The underlying key-value store is an opaque service: send a request, get
//! a (paged) result or an error. [`StoreClient`] is the only surface the
//! planner, fetchers, loader and transaction buffer talk to.
//!
//! [`MemoryStore`] implements the same surface in process. It evaluates the
//! key-condition and filter expressions this crate emits, pages results, and
//! records every request so callers can assert on access paths.

mod client;
mod errors;
mod expression;
mod memory;

pub use client::{
    BatchGetOutput, BatchGetRequest, DeleteItemRequest, ExpressionAttributes, Page,
    PutItemRequest, QueryRequest, ScanRequest, StoreClient, StoreFuture, TransactWriteItem,
    TransactWriteRequest, UpdateItemRequest, MAX_BATCH_GET_KEYS, MAX_TRANSACTION_ITEMS,
};
pub use errors::StoreError;
pub use memory::{MemoryStore, RecordedRequest};
