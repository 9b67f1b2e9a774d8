//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1.

use rusqlite::Connection;

use personal_server_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis() as i64],
            )?;
        }
        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "store schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: operations table.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE operations (
            operation_id BLOB PRIMARY KEY,    -- 16 bytes
            permission_id INTEGER NOT NULL,
            requester BLOB NOT NULL,          -- 20-byte address
            operation TEXT,                   -- granted operation tag
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,      -- Unix ms
            started_at INTEGER,
            finished_at INTEGER,
            upstream_task_id TEXT,
            outcome BLOB                      -- CBOR OperationOutcome
        );

        CREATE INDEX idx_operations_status ON operations(status, created_at);
        CREATE INDEX idx_operations_permission ON operations(permission_id);
        "#,
    )?;
    Ok(())
}
