//! Schema creation from the entity registry

use std::collections::HashSet;

use crate::conflict::Side;
use crate::error::StoreResult;
use crate::models::UPDATED_AT_COLUMN;
use crate::schema::{EntityDescriptor, SchemaRegistry};
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Bring the store's schema up to date.
///
/// Returns the number of entity tables that had to be created. Safe to run
/// repeatedly; tables dropped out from under a versioned store are recreated.
pub async fn run(conn: &Connection, registry: &SchemaRegistry, side: Side) -> StoreResult<usize> {
    let version = get_version(conn).await?;
    let existing = list_tables(conn).await?;
    let missing = registry
        .ordered()
        .iter()
        .filter(|entity| !existing.contains(entity.table_for(side)))
        .count();

    if version < 1 {
        migrate_v1(conn, registry, side).await?;
    } else if missing > 0 {
        tracing::warn!("{missing} registered tables missing at schema version {version}; recreating");
        create_entity_tables(conn, registry, side, None).await?;
    }

    Ok(missing)
}

/// Names of all tables in the store
pub async fn list_tables(conn: &Connection) -> StoreResult<HashSet<String>> {
    let mut rows = conn
        .query("SELECT name FROM sqlite_master WHERE type = 'table'", ())
        .await?;

    let mut tables = HashSet::new();
    while let Some(row) = rows.next().await? {
        tables.insert(row.get::<String>(0)?);
    }
    Ok(tables)
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> StoreResult<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: every registered entity table
async fn migrate_v1(conn: &Connection, registry: &SchemaRegistry, side: Side) -> StoreResult<()> {
    create_entity_tables(
        conn,
        registry,
        side,
        Some("INSERT INTO schema_version (version) VALUES (1)"),
    )
    .await?;

    tracing::info!("Migrated {} store to version {CURRENT_VERSION}", side);
    Ok(())
}

async fn create_entity_tables(
    conn: &Connection,
    registry: &SchemaRegistry,
    side: Side,
    version_marker: Option<&str>,
) -> StoreResult<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // Using a transaction for atomicity
    let mut statements = vec![
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
    ];
    for entity in registry.ordered() {
        statements.push(create_table_sql(registry, entity, side));
        statements.extend(create_index_sql(entity, side));
    }
    if let Some(marker) = version_marker {
        statements.push(marker.to_string());
    }

    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in &statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// `CREATE TABLE` statement for an entity on the given side
pub fn create_table_sql(registry: &SchemaRegistry, entity: &EntityDescriptor, side: Side) -> String {
    let mut lines: Vec<String> = entity
        .all_columns()
        .iter()
        .map(|column| {
            let mut line = format!("\"{}\" {}", column.name, column.kind.sql());
            if column.name == "id" {
                line.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();

    for (column, target) in entity.foreign_keys() {
        // Registry validation guarantees the target exists
        if let Ok(target) = registry.get(target) {
            lines.push(format!(
                "FOREIGN KEY (\"{column}\") REFERENCES \"{}\"(\"id\")",
                target.table_for(side)
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
        entity.table_for(side),
        lines.join(",\n    ")
    )
}

fn create_index_sql(entity: &EntityDescriptor, side: Side) -> Vec<String> {
    let table = entity.table_for(side);
    let mut statements = vec![format!(
        "CREATE INDEX IF NOT EXISTS \"idx_{table}_{UPDATED_AT_COLUMN}\" ON \"{table}\"(\"{UPDATED_AT_COLUMN}\" DESC)"
    )];
    statements.extend(entity.foreign_keys().map(|(column, _)| {
        format!("CREATE INDEX IF NOT EXISTS \"idx_{table}_{column}\" ON \"{table}\"(\"{column}\")")
    }));
    statements
}
