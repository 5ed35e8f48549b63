//! Transaction buffer
//!
//! Writes issued inside a transaction are collected in order and sent as
//! one all-or-nothing request. Reads inside the transaction consult the
//! buffer before the store.

mod buffer;

pub use buffer::{TransactionBuffer, TransactionState};
