//! Database migrations

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{FieldKind, SyncTable};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

const fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "TEXT",
        FieldKind::Integer | FieldKind::Bool => "INTEGER",
        FieldKind::Real => "REAL",
    }
}

/// DDL for one syncable entity table: bookkeeping columns, then domain columns
fn entity_table_sql(table: SyncTable) -> String {
    let name = table.as_str();
    let domain_columns = table
        .fields()
        .iter()
        .map(|spec| format!(",\n            {} {}", spec.name, column_type(spec.kind)))
        .collect::<String>();

    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            is_dirty INTEGER NOT NULL DEFAULT 1,
            last_synced_at INTEGER,
            revision INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL{domain_columns}
        );
        CREATE INDEX IF NOT EXISTS idx_{name}_dirty ON {name}(is_dirty);
        CREATE INDEX IF NOT EXISTS idx_{name}_updated ON {name}(updated_at);
        CREATE TRIGGER IF NOT EXISTS {name}_uuid_immutable BEFORE UPDATE OF uuid ON {name}
        FOR EACH ROW
        WHEN NEW.uuid IS NOT OLD.uuid
        BEGIN
            SELECT RAISE(ABORT, 'uuid is immutable');
        END;"
    )
}

/// Migration to version 1: entity tables and sync state
fn migrate_v1(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    for table in SyncTable::ALL {
        tx.execute_batch(&entity_table_sql(table))?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: durable conflict records
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            record_uuid TEXT NOT NULL,
            local_data TEXT NOT NULL,
            server_data TEXT NOT NULL,
            conflict_reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'resolved', 'ignored')),
            resolution_strategy TEXT
                CHECK (resolution_strategy IN ('local_wins', 'server_wins', 'merge')),
            resolved_by TEXT,
            resolved_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_status ON sync_conflicts(status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_conflicts_one_pending
            ON sync_conflicts(table_name, record_uuid) WHERE status = 'pending';
        CREATE TRIGGER IF NOT EXISTS sync_conflicts_terminal_guard BEFORE UPDATE ON sync_conflicts
        FOR EACH ROW
        WHEN OLD.status <> 'pending'
        BEGIN
            SELECT RAISE(ABORT, 'conflict already closed');
        END;
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        for table in SyncTable::ALL {
            assert!(table_exists(&conn, table.as_str()), "{table}");
        }
        assert!(table_exists(&conn, "sync_conflicts"));
        assert!(table_exists(&conn, "sync_state"));
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_uuid_column_is_immutable() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO customers (uuid, created_at, updated_at, name) VALUES ('a', 1, 1, 'Ada')",
            [],
        )
        .unwrap();

        let result = conn.execute("UPDATE customers SET uuid = 'b' WHERE uuid = 'a'", []);
        assert!(result.is_err());
    }
}
