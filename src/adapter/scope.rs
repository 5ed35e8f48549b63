//! Transaction scope

use std::collections::HashMap;

use tracing::debug;

use super::adapter::{key_of, merge_patch, physical_item, Adapter};
use crate::catalog::KeySchema;
use crate::errors::{AdapterError, AdapterResult};
use crate::executor::PredicateFilter;
use crate::planner::{normalize_conditions, Condition, FindQuery, NormalizedCondition};
use crate::store::TransactWriteItem;
use crate::transaction::{TransactionBuffer, TransactionState};
use crate::update::build_update;
use crate::value::{canonical_key, Item};

/// A stored row with a buffered update
struct StagedUpdate {
    table: String,
    /// Row as read from the store
    current: Item,
    /// Row as it will be after commit
    next: Item,
}

/// Writes collected for one atomic commit.
///
/// Reads through [`Transaction::find_one`] see rows written earlier in the
/// same transaction. Updates and deletes must name the full primary key
/// with equality conditions. Each row is written at most once per commit:
/// later writes to a row fold into the operation already buffered for it.
pub struct Transaction<'a> {
    adapter: &'a Adapter,
    buffer: TransactionBuffer,
    updates: HashMap<String, StagedUpdate>,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(adapter: &'a Adapter) -> Self {
        Self {
            adapter,
            buffer: TransactionBuffer::new(),
            updates: HashMap::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.buffer.state()
    }

    /// Number of buffered operations
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered rows first, then the store.
    pub async fn find_one(&self, query: &FindQuery) -> AdapterResult<Option<Item>> {
        let schema = self.adapter.schema();
        let table = schema.table_name(&query.model)?;
        let conditions = normalize_conditions(&query.model, &query.conditions, schema)?;
        if let Some(row) = self.buffer.search(&table, &conditions)? {
            debug!(model = query.model.as_str(), "read served from transaction buffer");
            return Ok(Some(row.clone()));
        }
        if let Some(staged) = self
            .updates
            .values()
            .find(|u| u.table == table && PredicateFilter::matches(&u.next, &conditions))
        {
            debug!(model = query.model.as_str(), "read served from buffered update");
            return Ok(Some(staged.next.clone()));
        }

        let Some(row) = self.adapter.find_one(query).await? else {
            return Ok(None);
        };
        let key = key_of(&query.model, &schema.primary_key(&query.model)?, &row)?;
        match self.buffer.pending(&table, &key)? {
            Some(TransactWriteItem::Delete { .. }) => Ok(None),
            // the buffered image no longer matches
            Some(TransactWriteItem::Update { .. }) => Ok(None),
            _ => Ok(Some(row)),
        }
    }

    /// Buffers a put of a new row.
    pub fn create(&mut self, model: &str, data: Item) -> AdapterResult<Item> {
        let schema = self.adapter.schema();
        let table = schema.table_name(model)?;
        let item = physical_item(schema, model, data);
        let key = key_of(model, &schema.primary_key(model)?, &item)?;

        let id = row_id(&table, &key);
        self.buffer.stage(
            TransactWriteItem::Put {
                table,
                item: item.clone(),
            },
            &key,
        )?;
        self.updates.remove(&id);
        Ok(item)
    }

    /// Buffers an update of the row identified by `conditions`.
    ///
    /// A row put earlier in this transaction gets its put rewritten with the
    /// merged row. A stored row gets one diff update against the stored
    /// version, however many times it is updated. Returns `None` when the
    /// row does not exist or was deleted in this transaction.
    pub async fn update(
        &mut self,
        model: &str,
        conditions: Vec<Condition>,
        patch: Item,
    ) -> AdapterResult<Option<Item>> {
        let schema = self.adapter.schema();
        let table = schema.table_name(model)?;
        let key_schema = schema.primary_key(model)?;
        let normalized = normalize_conditions(model, &conditions, schema)?;
        let key = key_from_conditions(model, &key_schema, &normalized)?;
        let id = row_id(&table, &key);

        match self.buffer.pending(&table, &key)?.cloned() {
            Some(TransactWriteItem::Put { item, .. }) => {
                if !PredicateFilter::matches(&item, &normalized) {
                    return Ok(None);
                }
                let next = merge_patch(schema, model, &key_schema, &item, patch);
                self.buffer.stage(
                    TransactWriteItem::Put {
                        table,
                        item: next.clone(),
                    },
                    &key,
                )?;
                return Ok(Some(next));
            }
            Some(TransactWriteItem::Delete { .. }) => return Ok(None),
            Some(TransactWriteItem::Update { .. }) | None => {}
        }

        let (current, base) = match self.updates.get(&id) {
            Some(staged) => {
                if !PredicateFilter::matches(&staged.next, &normalized) {
                    return Ok(None);
                }
                (staged.current.clone(), staged.next.clone())
            }
            None => {
                let query = FindQuery {
                    conditions,
                    ..FindQuery::new(model)
                };
                let Some(current) = self.adapter.find_one(&query).await? else {
                    return Ok(None);
                };
                (current.clone(), current)
            }
        };

        let next = merge_patch(schema, model, &key_schema, &base, patch);
        let diff = build_update(&current, &next)?;
        self.buffer.stage(
            TransactWriteItem::Update {
                table: table.clone(),
                key: key.clone(),
                update_expression: diff.expression,
                attributes: diff.attributes,
            },
            &key,
        )?;
        self.updates.insert(
            id,
            StagedUpdate {
                table,
                current,
                next: next.clone(),
            },
        );
        Ok(Some(next))
    }

    /// Buffers a delete of the row identified by `conditions`.
    ///
    /// Replaces any write already buffered for that row.
    pub fn delete(&mut self, model: &str, conditions: Vec<Condition>) -> AdapterResult<()> {
        let schema = self.adapter.schema();
        let table = schema.table_name(model)?;
        let key_schema = schema.primary_key(model)?;
        let normalized = normalize_conditions(model, &conditions, schema)?;
        let key = key_from_conditions(model, &key_schema, &normalized)?;

        let id = row_id(&table, &key);
        self.buffer.stage(
            TransactWriteItem::Delete {
                table,
                key: key.clone(),
            },
            &key,
        )?;
        self.updates.remove(&id);
        Ok(())
    }

    /// Sends every buffered write as one atomic request.
    pub async fn commit(mut self) -> AdapterResult<()> {
        self.buffer
            .commit(
                self.adapter.client(),
                self.adapter.config(),
                self.adapter.stats(),
            )
            .await
    }

    /// Discards every buffered write.
    pub fn abort(mut self) -> AdapterResult<()> {
        self.buffer.abort()
    }
}

/// Full primary key from equality conditions joined by AND
fn key_from_conditions(
    model: &str,
    key_schema: &KeySchema,
    conditions: &[NormalizedCondition],
) -> AdapterResult<Item> {
    let mut key = Item::new();
    let attributes = std::iter::once(&key_schema.partition_key).chain(key_schema.sort_key.as_ref());
    for attribute in attributes {
        let value = conditions
            .iter()
            .find(|c| &c.field == attribute && c.is_key_equality() && !c.value.is_null())
            .map(|c| c.value.clone())
            .ok_or_else(|| AdapterError::missing_key_condition(model))?;
        key.insert(attribute.clone(), value);
    }
    Ok(key)
}

fn row_id(table: &str, key: &Item) -> String {
    let parts: Vec<String> = key.values().map(canonical_key).collect();
    format!("{}/{}", table, parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelDef, StaticSchema};
    use crate::errors::AdapterErrorCode;
    use crate::store::{MemoryStore, RecordedRequest};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, Adapter) {
        let schema = StaticSchema::new().with_model(ModelDef::new("user", "users", "id"));
        let store = Arc::new(MemoryStore::from_schema(&schema));
        store.seed("users", vec![json!({"id": 1, "name": "ada", "visits": 1})]);
        let adapter = Adapter::new(store.clone(), Arc::new(schema));
        (store, adapter)
    }

    #[tokio::test]
    async fn test_find_one_reads_buffer_first() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.create("user", item(json!({"id": 2, "name": "bob"}))).unwrap();

        let row = tx
            .find_one(&FindQuery::new("user").filter_eq("id", json!(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], json!("bob"));
        assert!(store.requests().is_empty());

        let stored = tx
            .find_one(&FindQuery::new("user").filter_eq("id", json!(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], json!("ada"));
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes_at_once() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.create("user", item(json!({"id": 2, "name": "bob"}))).unwrap();
        tx.update("user", vec![Condition::eq("id", json!(1))], item(json!({"visits": 4})))
            .await
            .unwrap();
        tx.delete("user", vec![Condition::eq("id", json!(2))]).unwrap();
        assert_eq!(tx.len(), 2);
        assert!(store.items("users").iter().all(|r| r["id"] != json!(2)));

        store.clear_requests();
        tx.commit().await.unwrap();

        let requests = store.requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(&requests[0], RecordedRequest::TransactWrite(req) if req.items.len() == 2));

        let rows = store.items("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["visits"], json!(4));
    }

    #[tokio::test]
    async fn test_update_of_buffered_row_rewrites_put() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.create("user", item(json!({"id": 3, "name": "cy"}))).unwrap();
        tx.update("user", vec![Condition::eq("id", json!(3))], item(json!({"name": "cyd"})))
            .await
            .unwrap();

        let row = tx
            .find_one(&FindQuery::new("user").filter_eq("id", json!(3)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], json!("cyd"));
        assert!(store.requests().is_empty());
        assert_eq!(tx.len(), 1);

        tx.commit().await.unwrap();
        let requests = store.requests();
        assert!(matches!(&requests[0], RecordedRequest::TransactWrite(req) if req.items.len() == 1));
        let rows = store.items("users");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"], json!("cyd"));
    }

    #[tokio::test]
    async fn test_repeated_updates_fold_into_one_write() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.update("user", vec![Condition::eq("id", json!(1))], item(json!({"visits": 4})))
            .await
            .unwrap();
        let second = tx
            .update("user", vec![Condition::eq("id", json!(1))], item(json!({"name": "ada b"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second["visits"], json!(4));
        assert_eq!(tx.len(), 1);

        let seen = tx
            .find_one(&FindQuery::new("user").filter_eq("name", json!("ada b")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen["visits"], json!(4));

        store.clear_requests();
        tx.commit().await.unwrap();
        match &store.requests()[0] {
            RecordedRequest::TransactWrite(req) => match &req.items[..] {
                [TransactWriteItem::Update { update_expression, .. }] => {
                    assert_eq!(update_expression, "SET #f0 = :v0 ADD #f1 :v1");
                }
                other => panic!("unexpected operations: {:?}", other),
            },
            other => panic!("unexpected request: {:?}", other),
        }
        let rows = store.items("users");
        assert_eq!(rows[0]["visits"], json!(4));
        assert_eq!(rows[0]["name"], json!("ada b"));
    }

    #[tokio::test]
    async fn test_delete_after_create_replaces_put() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.create("user", item(json!({"id": 5, "name": "eve"}))).unwrap();
        tx.delete("user", vec![Condition::eq("id", json!(5))]).unwrap();
        assert_eq!(tx.len(), 1);

        let gone = tx
            .update("user", vec![Condition::eq("id", json!(5))], item(json!({"name": "x"})))
            .await
            .unwrap();
        assert!(gone.is_none());

        tx.commit().await.unwrap();
        assert!(store.items("users").iter().all(|r| r["id"] != json!(5)));
    }

    #[tokio::test]
    async fn test_deleted_stored_row_hidden_from_reads() {
        let (_, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.delete("user", vec![Condition::eq("id", json!(1))]).unwrap();
        let row = tx
            .find_one(&FindQuery::new("user").filter_eq("id", json!(1)))
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_key_equality() {
        let (_, adapter) = setup();
        let mut tx = adapter.transaction();
        let err = tx
            .delete("user", vec![Condition::eq("name", json!("ada"))])
            .unwrap_err();
        assert_eq!(err.code(), AdapterErrorCode::MissingKeyCondition);
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_abort_sends_nothing() {
        let (store, adapter) = setup();
        let mut tx = adapter.transaction();
        tx.create("user", item(json!({"id": 9}))).unwrap();
        tx.abort().unwrap();
        assert!(store.requests().is_empty());
        assert_eq!(store.items("users").len(), 1);
    }
}
