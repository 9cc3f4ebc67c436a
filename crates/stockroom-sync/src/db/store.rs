//! Record-level store access shared by both replication directions

use std::sync::Arc;

use async_trait::async_trait;
use libsql::params::Params;
use libsql::Value as SqlValue;
use serde_json::{Map, Number, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::connection::Database;
use super::migrations;
use crate::conflict::Side;
use crate::error::{StoreError, StoreResult};
use crate::models::{Record, DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN};
use crate::schema::{ColumnType, EntityDescriptor, SchemaRegistry};

/// Guard serializing writers against an open sync transaction
pub type WriteGuard = OwnedMutexGuard<()>;

/// Strongly-typed accessor over one store.
///
/// Tables are resolved through the [`EntityDescriptor`] for this store's
/// [`Side`], never by free-form name.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Which side of the replication this store is
    fn side(&self) -> Side;

    /// Lightweight round trip proving the store answers
    async fn ping(&self) -> StoreResult<()>;

    /// Physical table names present in the store
    async fn list_tables(&self) -> StoreResult<Vec<String>>;

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(self.list_tables().await?.iter().any(|name| name == table))
    }

    /// Row count, tombstones included
    async fn count_records(&self, entity: &EntityDescriptor) -> StoreResult<u64>;

    async fn find_by_id(&self, entity: &EntityDescriptor, id: &str) -> StoreResult<Option<Record>>;

    /// Every row, tombstones included, oldest update first
    async fn list_all(&self, entity: &EntityDescriptor) -> StoreResult<Vec<Record>>;

    async fn insert(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()>;

    /// Overwrite the columns present in `record`
    async fn update(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()>;

    /// Tombstone a live record. Returns whether a row changed.
    async fn delete(&self, entity: &EntityDescriptor, id: &str, deleted_at: i64)
        -> StoreResult<bool>;

    async fn begin(&self) -> StoreResult<()>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;

    /// Enable or relax foreign-key enforcement. Must be called outside a transaction.
    async fn set_referential_checks(&self, enabled: bool) -> StoreResult<()>;

    /// Create any missing registered tables; returns how many were created
    async fn create_schema(&self, registry: &SchemaRegistry) -> StoreResult<usize>;

    /// Exclusive write access while a sync transaction is open
    async fn lock_writes(&self) -> WriteGuard;
}

/// libSQL-backed store, local file or remote server
pub struct LibSqlStore {
    db: Mutex<Database>,
    side: Side,
    writes: Arc<Mutex<()>>,
}

impl LibSqlStore {
    pub fn new(db: Database, side: Side) -> Self {
        Self {
            db: Mutex::new(db),
            side,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// In-memory store (primarily for tests)
    pub async fn in_memory(side: Side) -> crate::Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?, side))
    }

    /// Filesystem path when this is a local file store
    pub async fn path(&self) -> Option<std::path::PathBuf> {
        self.db.lock().await.path().map(std::path::Path::to_path_buf)
    }

    /// Run a statement directly (maintenance and tests)
    pub async fn execute(&self, sql: &str) -> StoreResult<u64> {
        let db = self.db.lock().await;
        Ok(db.connection().execute(sql, ()).await?)
    }

    async fn execute_with(&self, sql: &str, values: Vec<SqlValue>) -> StoreResult<u64> {
        let db = self.db.lock().await;
        Ok(db
            .connection()
            .execute(sql, Params::Positional(values))
            .await?)
    }

    async fn query_records(
        &self,
        entity: &EntityDescriptor,
        sql: &str,
        values: Vec<SqlValue>,
    ) -> StoreResult<Vec<Record>> {
        let columns = entity.all_columns();
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(sql, Params::Positional(values))
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut map = Map::new();
            for (index, column) in columns.iter().enumerate() {
                let index = i32::try_from(index)
                    .map_err(|_| StoreError::Other("too many columns".to_string()))?;
                let value = row.get_value(index)?;
                map.insert(column.name.to_string(), from_sql_value(value, column.kind));
            }
            records.push(Record::from_map(map).map_err(|error| StoreError::Other(error.to_string()))?);
        }
        Ok(records)
    }

    fn table<'a>(&self, entity: &'a EntityDescriptor) -> &'a str {
        entity.table_for(self.side)
    }

    fn select_sql(&self, entity: &EntityDescriptor) -> String {
        let columns = entity
            .all_columns()
            .iter()
            .map(|column| format!("\"{}\"", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {columns} FROM \"{}\"", self.table(entity))
    }
}

#[async_trait]
impl SyncStore for LibSqlStore {
    fn side(&self) -> Side {
        self.side
    }

    async fn ping(&self) -> StoreResult<()> {
        let db = self.db.lock().await;
        let mut rows = db.connection().query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }

    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        let db = self.db.lock().await;
        let mut tables: Vec<String> = migrations::list_tables(db.connection())
            .await?
            .into_iter()
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn count_records(&self, entity: &EntityDescriptor) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table(entity));
        let db = self.db.lock().await;
        let mut rows = db.connection().query(&sql, ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn find_by_id(&self, entity: &EntityDescriptor, id: &str) -> StoreResult<Option<Record>> {
        let sql = format!("{} WHERE \"{ID_COLUMN}\" = ?1", self.select_sql(entity));
        let mut records = self
            .query_records(entity, &sql, vec![SqlValue::Text(id.to_string())])
            .await?;
        Ok(records.pop())
    }

    async fn list_all(&self, entity: &EntityDescriptor) -> StoreResult<Vec<Record>> {
        let sql = format!(
            "{} ORDER BY \"{UPDATED_AT_COLUMN}\" ASC, \"{ID_COLUMN}\" ASC",
            self.select_sql(entity)
        );
        self.query_records(entity, &sql, Vec::new()).await
    }

    async fn insert(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()> {
        let (columns, values) = bind_columns(entity, record, true);
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({placeholders})",
            self.table(entity),
            quoted(&columns)
        );
        self.execute_with(&sql, values).await?;
        Ok(())
    }

    async fn update(&self, entity: &EntityDescriptor, record: &Record) -> StoreResult<()> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::Other("record without id".to_string()))?
            .to_string();
        let (columns, mut values) = bind_columns(entity, record, false);
        if columns.is_empty() {
            return Ok(());
        }
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("\"{column}\" = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE \"{}\" SET {assignments} WHERE \"{ID_COLUMN}\" = ?{}",
            self.table(entity),
            columns.len() + 1
        );
        values.push(SqlValue::Text(id));
        self.execute_with(&sql, values).await?;
        Ok(())
    }

    async fn delete(
        &self,
        entity: &EntityDescriptor,
        id: &str,
        deleted_at: i64,
    ) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE \"{}\" SET \"{DELETED_AT_COLUMN}\" = ?1, \"{UPDATED_AT_COLUMN}\" = MAX(\"{UPDATED_AT_COLUMN}\", ?1) \
             WHERE \"{ID_COLUMN}\" = ?2 AND \"{DELETED_AT_COLUMN}\" IS NULL",
            self.table(entity)
        );
        let rows = self
            .execute_with(
                &sql,
                vec![SqlValue::Integer(deleted_at), SqlValue::Text(id.to_string())],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn begin(&self) -> StoreResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&self) -> StoreResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> StoreResult<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    async fn set_referential_checks(&self, enabled: bool) -> StoreResult<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        self.execute(sql).await.map(|_| ())
    }

    async fn create_schema(&self, registry: &SchemaRegistry) -> StoreResult<usize> {
        let db = self.db.lock().await;
        migrations::run(db.connection(), registry, self.side).await
    }

    async fn lock_writes(&self) -> WriteGuard {
        Arc::clone(&self.writes).lock_owned().await
    }
}

/// Registered columns present in `record`, with their bound values
fn bind_columns(
    entity: &EntityDescriptor,
    record: &Record,
    include_id: bool,
) -> (Vec<&'static str>, Vec<SqlValue>) {
    entity
        .all_columns()
        .into_iter()
        .filter(|column| include_id || column.name != ID_COLUMN)
        .filter_map(|column| {
            record
                .get(column.name)
                .map(|value| (column.name, to_sql_value(value, column.kind)))
        })
        .unzip()
}

fn quoted(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::cast_possible_truncation)]
fn to_sql_value(value: &Value, kind: ColumnType) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match kind {
            ColumnType::Integer => number
                .as_i64()
                .map_or_else(|| SqlValue::Real(number.as_f64().unwrap_or_default()), SqlValue::Integer),
            ColumnType::Real => SqlValue::Real(number.as_f64().unwrap_or_default()),
            ColumnType::Text => SqlValue::Text(number.to_string()),
        },
        Value::String(text) => match kind {
            ColumnType::Integer => text
                .trim()
                .parse::<i64>()
                .map_or_else(|_| SqlValue::Text(text.clone()), SqlValue::Integer),
            ColumnType::Real => text
                .trim()
                .parse::<f64>()
                .map_or_else(|_| SqlValue::Text(text.clone()), SqlValue::Real),
            ColumnType::Text => SqlValue::Text(text.clone()),
        },
        nested => SqlValue::Text(nested.to_string()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn from_sql_value(value: SqlValue, kind: ColumnType) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => match kind {
            ColumnType::Real => Number::from_f64(number as f64).map_or(Value::Null, Value::Number),
            _ => Value::from(number),
        },
        SqlValue::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::from(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn store() -> (LibSqlStore, SchemaRegistry) {
        let registry = SchemaRegistry::standard().unwrap();
        let store = LibSqlStore::in_memory(Side::Local).await.unwrap();
        store.create_schema(&registry).await.unwrap();
        (store, registry)
    }

    fn category(id: &str, updated_at: i64) -> Record {
        Record::from_value(json!({
            "id": id,
            "name": "Beverages",
            "description": null,
            "created_at": 1,
            "updated_at": updated_at,
            "deleted_at": null,
        }))
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_and_find_roundtrip() {
        let (store, registry) = store().await;
        let entity = registry.get("Category").unwrap();
        let record = category("cat-1", 10);

        store.insert(entity, &record).await.unwrap();
        let found = store.find_by_id(entity, "cat-1").await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(store.find_by_id(entity, "missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_insert_is_classified() {
        let (store, registry) = store().await;
        let entity = registry.get("Category").unwrap();
        store.insert(entity, &category("cat-1", 10)).await.unwrap();

        let error = store.insert(entity, &category("cat-1", 10)).await.unwrap_err();
        assert!(matches!(error, StoreError::DuplicateIdentity(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_parent_is_referential_error() {
        let (store, registry) = store().await;
        let entity = registry.get("Product").unwrap();
        let product = Record::from_value(json!({
            "id": "p-1",
            "name": "Cola",
            "price": 1.5,
            "stock": 4,
            "category_id": "cat-missing",
            "created_at": 1,
            "updated_at": 1,
        }))
        .unwrap();

        let error = store.insert(entity, &product).await.unwrap_err();
        assert!(matches!(error, StoreError::ReferentialIntegrity(_)));

        store.set_referential_checks(false).await.unwrap();
        store.insert(entity, &product).await.unwrap();
        store.set_referential_checks(true).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_only_touches_present_columns() {
        let (store, registry) = store().await;
        let entity = registry.get("Category").unwrap();
        store.insert(entity, &category("cat-1", 10)).await.unwrap();

        let partial = Record::from_value(json!({"id": "cat-1", "description": "Drinks", "updated_at": 20}))
            .unwrap();
        store.update(entity, &partial).await.unwrap();

        let found = store.find_by_id(entity, "cat-1").await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("Beverages")));
        assert_eq!(found.get("description"), Some(&json!("Drinks")));
        assert_eq!(found.updated_at(), Some(20));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_writes_tombstone_once() {
        let (store, registry) = store().await;
        let entity = registry.get("Category").unwrap();
        store.insert(entity, &category("cat-1", 10)).await.unwrap();

        assert!(store.delete(entity, "cat-1", 50).await.unwrap());
        assert!(!store.delete(entity, "cat-1", 60).await.unwrap());

        let found = store.find_by_id(entity, "cat-1").await.unwrap().unwrap();
        assert_eq!(found.deleted_at(), Some(50));
        assert_eq!(found.updated_at(), Some(50));
        assert_eq!(store.count_records(entity).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_table_is_schema_mismatch() {
        let registry = SchemaRegistry::standard().unwrap();
        let store = LibSqlStore::in_memory(Side::Remote).await.unwrap();
        let entity = registry.get("Customer").unwrap();

        let error = store.list_all(entity).await.unwrap_err();
        assert_eq!(error, StoreError::SchemaMismatch("customers".to_string()));
        assert!(!store.table_exists("customers").await.unwrap());
    }

    #[test]
    fn sql_value_conversion_respects_column_type() {
        assert_eq!(
            to_sql_value(&json!("42"), ColumnType::Integer),
            SqlValue::Integer(42)
        );
        assert_eq!(to_sql_value(&json!(3), ColumnType::Real), SqlValue::Real(3.0));
        assert_eq!(to_sql_value(&json!(true), ColumnType::Integer), SqlValue::Integer(1));
        assert_eq!(from_sql_value(SqlValue::Integer(2), ColumnType::Real), json!(2.0));
    }
}
