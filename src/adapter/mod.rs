//! Adapter facade
//!
//! Wires the planner, executor, update-diff engine, loader and transaction
//! buffer behind CRUD calls on logical models.

mod adapter;
mod scope;

pub use adapter::Adapter;
pub use scope::Transaction;
