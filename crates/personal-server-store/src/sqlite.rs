//! SQLite implementation of the OperationStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use personal_server_core::{
    now_millis, Address, Operation, OperationId, OperationOutcome, OperationStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::OperationStore;

const SELECT_COLUMNS: &str = "operation_id, permission_id, requester, operation, status, \
     created_at, started_at, finished_at, upstream_task_id, outcome";

/// SQLite-backed operation store.
///
/// Thread-safe via an internal Mutex.
#[derive(Clone)]
pub struct SqliteOperationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOperationStore {
    /// Open a database at `path`, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn encode_outcome(outcome: &OperationOutcome) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(outcome, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_outcome(bytes: &[u8]) -> Result<OperationOutcome> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Raw column values, converted outside the rusqlite row callback.
struct OperationRow {
    id: Vec<u8>,
    permission_id: i64,
    requester: Vec<u8>,
    operation: Option<String>,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    upstream_task_id: Option<String>,
    outcome: Option<Vec<u8>>,
}

impl OperationRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("operation_id")?,
            permission_id: row.get("permission_id")?,
            requester: row.get("requester")?,
            operation: row.get("operation")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            upstream_task_id: row.get("upstream_task_id")?,
            outcome: row.get("outcome")?,
        })
    }

    fn into_operation(self) -> Result<Operation> {
        let id: [u8; 16] = self
            .id
            .try_into()
            .map_err(|_| StoreError::InvalidData("operation_id is not 16 bytes".into()))?;
        let requester: [u8; 20] = self
            .requester
            .try_into()
            .map_err(|_| StoreError::InvalidData("requester is not 20 bytes".into()))?;
        let status = OperationStatus::parse(&self.status)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown status '{}'", self.status)))?;
        let outcome = self.outcome.as_deref().map(decode_outcome).transpose()?;

        Ok(Operation {
            id: OperationId::from_bytes(id),
            permission_id: self.permission_id as u64,
            requester: Address::from_bytes(requester),
            operation: self.operation,
            status,
            created_at: self.created_at as u64,
            started_at: self.started_at.map(|t| t as u64),
            finished_at: self.finished_at.map(|t| t as u64),
            upstream_task_id: self.upstream_task_id,
            outcome,
        })
    }
}

fn load(conn: &Connection, id: &OperationId) -> Result<Option<Operation>> {
    let sql = format!("SELECT {} FROM operations WHERE operation_id = ?1", SELECT_COLUMNS);
    conn.query_row(&sql, params![id.as_bytes().as_slice()], OperationRow::read)
        .optional()?
        .map(OperationRow::into_operation)
        .transpose()
}

fn write_state(conn: &Connection, op: &Operation) -> Result<()> {
    let outcome = op.outcome.as_ref().map(encode_outcome).transpose()?;
    let updated = conn.execute(
        "UPDATE operations SET operation = ?2, status = ?3, started_at = ?4, finished_at = ?5,
             upstream_task_id = ?6, outcome = ?7
         WHERE operation_id = ?1",
        params![
            op.id.as_bytes().as_slice(),
            op.operation,
            op.status.as_str(),
            op.started_at.map(|t| t as i64),
            op.finished_at.map(|t| t as i64),
            op.upstream_task_id,
            outcome,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(op.id.to_hex()));
    }
    Ok(())
}

/// Load, modify and write back one record inside a transaction.
fn update<F>(conn: &mut Connection, id: &OperationId, f: F) -> Result<Operation>
where
    F: FnOnce(&mut Operation) -> Result<()>,
{
    let tx = conn.transaction()?;
    let mut op = load(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_hex()))?;
    f(&mut op)?;
    write_state(&tx, &op)?;
    tx.commit()?;
    Ok(op)
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn insert(&self, operation: &Operation) -> Result<()> {
        let op = operation.clone();
        self.blocking(move |conn| {
            let outcome = op.outcome.as_ref().map(encode_outcome).transpose()?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO operations (
                    operation_id, permission_id, requester, operation, status,
                    created_at, started_at, finished_at, upstream_task_id, outcome
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    op.id.as_bytes().as_slice(),
                    op.permission_id as i64,
                    op.requester.as_bytes().as_slice(),
                    op.operation,
                    op.status.as_str(),
                    op.created_at as i64,
                    op.started_at.map(|t| t as i64),
                    op.finished_at.map(|t| t as i64),
                    op.upstream_task_id,
                    outcome,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Duplicate(op.id.to_hex()));
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &OperationId) -> Result<Option<Operation>> {
        let id = *id;
        self.blocking(move |conn| load(conn, &id)).await
    }

    async fn transition(
        &self,
        id: &OperationId,
        to: OperationStatus,
        outcome: Option<OperationOutcome>,
    ) -> Result<Operation> {
        let id = *id;
        self.blocking(move |conn| {
            update(conn, &id, |op| Ok(op.transition(to, outcome, now_millis())?))
        })
        .await
    }

    async fn set_operation_tag(&self, id: &OperationId, operation: &str) -> Result<()> {
        let id = *id;
        let operation = operation.to_string();
        self.blocking(move |conn| {
            update(conn, &id, |op| {
                op.operation = Some(operation);
                Ok(())
            })
            .map(|_| ())
        })
        .await
    }

    async fn set_upstream_task(&self, id: &OperationId, task_id: &str) -> Result<()> {
        let id = *id;
        let task_id = task_id.to_string();
        self.blocking(move |conn| {
            update(conn, &id, |op| {
                op.upstream_task_id = Some(task_id);
                Ok(())
            })
            .map(|_| ())
        })
        .await
    }

    async fn list_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>> {
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM operations WHERE status = ?1 ORDER BY created_at, operation_id",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status.as_str()], OperationRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(OperationRow::into_operation).collect()
        })
        .await
    }
}
