//! Model catalog
//!
//! The planner never hard-codes table layouts. It asks a [`SchemaResolver`]
//! for the physical table, field names, primary key and secondary indexes of
//! a logical model. [`StaticSchema`] is an in-memory resolver built from
//! declarative model definitions.

mod resolver;
mod static_schema;

pub use resolver::{KeySchema, SchemaResolver};
pub use static_schema::{IndexDef, ModelDef, StaticSchema};
