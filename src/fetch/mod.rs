//! Paginated fetchers
//!
//! Query, scan and batch-get against a [`StoreClient`], with page
//! budgets, transient-error retry and unprocessed-key backoff. Every
//! request the adapter reads with goes through a [`Fetcher`].

mod batch;
mod paginate;
mod retry;

pub(crate) use retry::with_retry;

use crate::config::AdapterConfig;
use crate::observability::OperationStats;
use crate::store::StoreClient;

/// Read-side request driver
pub struct Fetcher<'a> {
    client: &'a dyn StoreClient,
    config: &'a AdapterConfig,
    stats: &'a OperationStats,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        client: &'a dyn StoreClient,
        config: &'a AdapterConfig,
        stats: &'a OperationStats,
    ) -> Self {
        Self {
            client,
            config,
            stats,
        }
    }
}
