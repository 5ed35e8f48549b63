//! Query execution
//!
//! The executor consumes plans and produces rows.
//!
//! # Execution Flow (strict order)
//!
//! 1. Fetch through the base strategy (query, multi-query, batch get, scan)
//! 2. Filter in memory when the store could not
//! 3. Sort in memory when the chosen key does not serve the sort
//! 4. Apply offset, then limit
//! 5. Project selected fields (join local keys are kept)
//! 6. Resolve joins in declaration order

mod executor;
mod filters;
mod joins;
mod projection;
mod sorter;

pub use executor::QueryExecutor;
pub use filters::PredicateFilter;
pub use joins::JoinResolver;
pub use projection::Projection;
pub use sorter::ResultSorter;
