//! dynaquery - Query planning and execution for partition/sort-key stores
//!
//! Translates model-level find/count/create/update/delete calls into the
//! cheapest access path a key-value store with secondary indexes offers,
//! and finishes in memory whatever the store cannot evaluate.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod fetch;
pub mod loader;
pub mod observability;
pub mod planner;
pub mod store;
pub mod transaction;
pub mod update;
pub mod value;

pub use adapter::{Adapter, Transaction};
pub use config::{AdapterConfig, PageLimitMode, RetryConfig};
pub use errors::{AdapterError, AdapterErrorCode, AdapterResult, Severity};
pub use value::Item;
