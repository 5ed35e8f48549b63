//! Operation counters
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only when a new registry is created

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for store traffic and adapter-level operations
///
/// # Thread Safety
///
/// All counters are atomics with Relaxed ordering; a snapshot taken while
/// requests are in flight may mix before/after values.
#[derive(Debug, Default)]
pub struct OperationStats {
    /// Find operations executed
    finds: AtomicU64,
    /// Count operations executed
    counts: AtomicU64,
    /// Query requests sent (one per page)
    query_requests: AtomicU64,
    /// Scan requests sent (one per page)
    scan_requests: AtomicU64,
    /// Batch-get requests sent (one per chunk and retry round)
    batch_get_requests: AtomicU64,
    /// Requests repeated after a transient failure
    transient_retries: AtomicU64,
    /// Batch-get rounds repeated for unprocessed keys
    unprocessed_retries: AtomicU64,
    /// Rows dropped by the in-memory filter
    rows_filtered: AtomicU64,
    /// Loader flushes that reached the store
    loader_flushes: AtomicU64,
    /// Transactions sent to the store
    transactions_committed: AtomicU64,
    /// Single-item writes (put, update, delete)
    writes: AtomicU64,
}

impl OperationStats {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_finds(&self) {
        self.finds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_counts(&self) {
        self.counts.fetch_add(1, Ordering::Relaxed);
    }

    // Store traffic

    pub fn increment_query_requests(&self) {
        self.query_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scan_requests(&self) {
        self.scan_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batch_get_requests(&self) {
        self.batch_get_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transient_retries(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unprocessed_retries(&self) {
        self.unprocessed_retries.fetch_add(1, Ordering::Relaxed);
    }

    // In-memory work

    /// Record rows removed by the client-side filter
    pub fn add_rows_filtered(&self, rows: u64) {
        self.rows_filtered.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_loader_flushes(&self) {
        self.loader_flushes.fetch_add(1, Ordering::Relaxed);
    }

    // Writes

    pub fn increment_transactions(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            finds: self.finds.load(Ordering::Relaxed),
            counts: self.counts.load(Ordering::Relaxed),
            query_requests: self.query_requests.load(Ordering::Relaxed),
            scan_requests: self.scan_requests.load(Ordering::Relaxed),
            batch_get_requests: self.batch_get_requests.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            unprocessed_retries: self.unprocessed_retries.load(Ordering::Relaxed),
            rows_filtered: self.rows_filtered.load(Ordering::Relaxed),
            loader_flushes: self.loader_flushes.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`OperationStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub finds: u64,
    pub counts: u64,
    pub query_requests: u64,
    pub scan_requests: u64,
    pub batch_get_requests: u64,
    pub transient_retries: u64,
    pub unprocessed_retries: u64,
    pub rows_filtered: u64,
    pub loader_flushes: u64,
    pub transactions_committed: u64,
    pub writes: u64,
}
