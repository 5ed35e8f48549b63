//! Resolver contract consumed by the planner and executor

use serde::{Deserialize, Serialize};

use crate::errors::AdapterResult;

/// Partition key plus optional sort key of a table or secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    /// Partition (hash) key attribute
    pub partition_key: String,
    /// Sort (range) key attribute
    #[serde(default)]
    pub sort_key: Option<String>,
}

impl KeySchema {
    /// Partition key only
    pub fn hash(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Partition key and sort key
    pub fn composite(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    /// Returns true if the schema has no sort key
    pub fn is_simple(&self) -> bool {
        self.sort_key.is_none()
    }
}

/// Read-only view of model layout.
///
/// Field names passed to `index_name`, `index_key_schema` results and
/// `primary_key` are physical names, i.e. already mapped by `field_name`.
pub trait SchemaResolver: Send + Sync {
    /// Physical table backing a model
    fn table_name(&self, model: &str) -> AdapterResult<String>;

    /// Physical attribute name for a logical field
    fn field_name(&self, model: &str, field: &str) -> String {
        let _ = model;
        field.to_string()
    }

    /// Secondary index whose partition key is `field`, if any
    fn index_name(&self, model: &str, field: &str) -> Option<String>;

    /// Key schema of a named secondary index
    fn index_key_schema(&self, model: &str, index: &str) -> Option<KeySchema>;

    /// Key schema of the base table
    fn primary_key(&self, model: &str) -> AdapterResult<KeySchema>;
}
