//! Declarative in-memory schema resolver

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::resolver::{KeySchema, SchemaResolver};
use crate::errors::{AdapterError, AdapterResult};

/// A secondary index on a model's table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name as known to the store
    pub name: String,
    /// Index key attributes (physical names)
    #[serde(flatten)]
    pub keys: KeySchema,
}

impl IndexDef {
    /// Index with partition key only
    pub fn hash(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: KeySchema::hash(partition_key),
        }
    }

    /// Index with partition and sort key
    pub fn composite(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            keys: KeySchema::composite(partition_key, sort_key),
        }
    }
}

/// Layout of one logical model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Logical model name
    pub name: String,
    /// Physical table name
    pub table: String,
    /// Base table key schema (physical names)
    pub primary_key: KeySchema,
    /// Logical → physical field renames
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// Secondary indexes
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl ModelDef {
    /// Creates a model with a simple partition key
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: KeySchema::hash(partition_key),
            fields: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Replaces the base key schema
    pub fn with_primary_key(mut self, keys: KeySchema) -> Self {
        self.primary_key = keys;
        self
    }

    /// Adds a secondary index
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Maps a logical field to a physical attribute
    pub fn with_field(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.fields.insert(logical.into(), physical.into());
        self
    }
}

/// Schema resolver backed by a fixed set of model definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSchema {
    models: HashMap<String, ModelDef>,
}

impl StaticSchema {
    /// Creates an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, replacing any previous definition with that name
    pub fn with_model(mut self, model: ModelDef) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    /// Parses a list of model definitions from JSON
    pub fn from_json(raw: &str) -> AdapterResult<Self> {
        let models: Vec<ModelDef> = serde_json::from_str(raw)
            .map_err(|e| AdapterError::config_invalid(format!("Malformed schema: {}", e)))?;
        Ok(models
            .into_iter()
            .fold(Self::new(), |schema, model| schema.with_model(model)))
    }

    /// Registered model definitions
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    fn model(&self, model: &str) -> Option<&ModelDef> {
        self.models.get(model)
    }
}

impl SchemaResolver for StaticSchema {
    fn table_name(&self, model: &str) -> AdapterResult<String> {
        self.model(model)
            .map(|m| m.table.clone())
            .ok_or_else(|| AdapterError::missing_table(model))
    }

    fn field_name(&self, model: &str, field: &str) -> String {
        self.model(model)
            .and_then(|m| m.fields.get(field))
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }

    fn index_name(&self, model: &str, field: &str) -> Option<String> {
        self.model(model)?
            .indexes
            .iter()
            .find(|idx| idx.keys.partition_key == field)
            .map(|idx| idx.name.clone())
    }

    fn index_key_schema(&self, model: &str, index: &str) -> Option<KeySchema> {
        self.model(model)?
            .indexes
            .iter()
            .find(|idx| idx.name == index)
            .map(|idx| idx.keys.clone())
    }

    fn primary_key(&self, model: &str) -> AdapterResult<KeySchema> {
        self.model(model)
            .map(|m| m.primary_key.clone())
            .ok_or_else(|| AdapterError::missing_primary_key(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdapterErrorCode;

    fn session_schema() -> StaticSchema {
        StaticSchema::new().with_model(
            ModelDef::new("session", "sessions", "id")
                .with_field("userId", "user_id")
                .with_index(IndexDef::composite("user_idx", "user_id", "createdAt")),
        )
    }

    #[test]
    fn test_field_mapping_defaults_to_identity() {
        let schema = session_schema();
        assert_eq!(schema.field_name("session", "userId"), "user_id");
        assert_eq!(schema.field_name("session", "token"), "token");
    }

    #[test]
    fn test_index_lookup_by_partition_key() {
        let schema = session_schema();
        assert_eq!(
            schema.index_name("session", "user_id").as_deref(),
            Some("user_idx")
        );
        assert_eq!(schema.index_name("session", "createdAt"), None);
        let keys = schema.index_key_schema("session", "user_idx").unwrap();
        assert_eq!(keys.sort_key.as_deref(), Some("createdAt"));
    }

    #[test]
    fn test_unknown_model_fails_fast() {
        let schema = session_schema();
        assert_eq!(
            schema.table_name("account").unwrap_err().code(),
            AdapterErrorCode::MissingTable
        );
        assert_eq!(
            schema.primary_key("account").unwrap_err().code(),
            AdapterErrorCode::MissingPrimaryKey
        );
    }

    #[test]
    fn test_from_json() {
        let schema = StaticSchema::from_json(
            r#"[{
                "name": "user",
                "table": "users",
                "primary_key": {"partition_key": "id"},
                "indexes": [{"name": "email_idx", "partition_key": "email"}]
            }]"#,
        )
        .unwrap();
        assert_eq!(schema.table_name("user").unwrap(), "users");
        assert_eq!(schema.index_name("user", "email").as_deref(), Some("email_idx"));
    }
}
