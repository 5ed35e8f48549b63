//! Buffered atomic multi-write

use tracing::debug;
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::executor::PredicateFilter;
use crate::fetch::with_retry;
use crate::observability::OperationStats;
use crate::planner::NormalizedCondition;
use crate::store::{StoreClient, TransactWriteItem, TransactWriteRequest, MAX_TRANSACTION_ITEMS};
use crate::value::Item;

/// Lifecycle of a transaction buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations
    Open,
    /// Sent to the store successfully
    Committed,
    /// Discarded by the caller, or the commit failed
    Aborted,
}

/// Ordered writes waiting for one atomic commit.
///
/// Holds at most 25 operations. Once committed or aborted every call
/// fails with `DQ_TRANSACTION_CLOSED`.
#[derive(Debug)]
pub struct TransactionBuffer {
    operations: Vec<TransactWriteItem>,
    state: TransactionState,
}

impl Default for TransactionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Buffered operations in insertion order
    pub fn operations(&self) -> &[TransactWriteItem] {
        &self.operations
    }

    /// Appends an operation. A full buffer is left unchanged.
    pub fn add(&mut self, operation: TransactWriteItem) -> AdapterResult<()> {
        self.ensure_open()?;
        if self.operations.len() >= MAX_TRANSACTION_ITEMS {
            return Err(AdapterError::transaction_limit(MAX_TRANSACTION_ITEMS));
        }
        self.operations.push(operation);
        Ok(())
    }

    /// Operation buffered for the row whose primary key is `key`
    pub fn pending(&self, table: &str, key: &Item) -> AdapterResult<Option<&TransactWriteItem>> {
        self.ensure_open()?;
        Ok(self.position(table, key).map(|i| &self.operations[i]))
    }

    /// Buffers `operation` as the only write for the row whose primary key
    /// is `key`.
    ///
    /// An operation already buffered for that row is replaced in place and
    /// does not count against the limit again.
    pub fn stage(&mut self, operation: TransactWriteItem, key: &Item) -> AdapterResult<()> {
        self.ensure_open()?;
        match self.position(operation.table(), key) {
            Some(i) => {
                self.operations[i] = operation;
                Ok(())
            }
            None => self.add(operation),
        }
    }

    fn position(&self, table: &str, key: &Item) -> Option<usize> {
        self.operations
            .iter()
            .rposition(|op| op.table() == table && op.targets(key))
    }

    /// Most recently buffered put on `table` whose item satisfies every
    /// condition.
    pub fn search(
        &self,
        table: &str,
        conditions: &[NormalizedCondition],
    ) -> AdapterResult<Option<&Item>> {
        self.ensure_open()?;
        let found = self.operations.iter().rev().find_map(|op| match op {
            TransactWriteItem::Put { table: t, item }
                if t == table && PredicateFilter::matches(item, conditions) =>
            {
                Some(item)
            }
            _ => None,
        });
        Ok(found)
    }

    /// Sends every buffered operation as one atomic write and closes the
    /// buffer.
    ///
    /// An empty buffer closes without a request. Retries of a transient
    /// failure reuse the same idempotency token.
    pub async fn commit(
        &mut self,
        client: &dyn StoreClient,
        config: &AdapterConfig,
        stats: &OperationStats,
    ) -> AdapterResult<()> {
        self.ensure_open()?;
        if self.operations.is_empty() {
            self.state = TransactionState::Committed;
            return Ok(());
        }

        let request = TransactWriteRequest {
            items: std::mem::take(&mut self.operations),
            client_token: Uuid::new_v4().to_string(),
        };
        debug!(
            operations = request.items.len(),
            token = %request.client_token,
            "committing transaction"
        );

        let result = with_retry(&config.retry, stats, "transact_write", || {
            client.transact_write(request.clone())
        })
        .await;

        match result {
            Ok(()) => {
                stats.increment_transactions();
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = TransactionState::Aborted;
                Err(err)
            }
        }
    }

    /// Discards every buffered operation and closes the buffer.
    pub fn abort(&mut self) -> AdapterResult<()> {
        self.ensure_open()?;
        self.operations.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }

    fn ensure_open(&self) -> AdapterResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            _ => Err(AdapterError::transaction_closed()),
        }
    }
}
