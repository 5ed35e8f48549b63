//! Observability
//!
//! - Structured logs through `tracing` (the crate installs no subscriber)
//! - Exact operation counters
//!
//! Observability is read-only: nothing here changes execution.
//!
//! # Usage
//!
//! ```ignore
//! use dynaquery::observability::OperationStats;
//!
//! let stats = OperationStats::new();
//! stats.increment_query_requests();
//! println!("{}", stats.to_json());
//! ```

mod metrics;

pub use metrics::{OperationStats, StatsSnapshot};
