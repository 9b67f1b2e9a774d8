//! In-memory implementation of the OperationStore trait.
//!
//! Same semantics as SQLite, no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use personal_server_core::{now_millis, Operation, OperationId, OperationOutcome, OperationStatus};

use crate::error::{Result, StoreError};
use crate::traits::OperationStore;

/// In-memory store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryOperationStore {
    operations: RwLock<HashMap<OperationId, Operation>>,
}

impl MemoryOperationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
        StoreError::Task(format!("lock poisoned: {}", e))
    }

    fn update<F>(&self, id: &OperationId, f: F) -> Result<Operation>
    where
        F: FnOnce(&mut Operation) -> Result<()>,
    {
        let mut ops = self.operations.write().map_err(Self::poisoned)?;
        let op = ops
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;
        // Work on a copy so a failed update leaves the record untouched.
        let mut next = op.clone();
        f(&mut next)?;
        *op = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn insert(&self, operation: &Operation) -> Result<()> {
        let mut ops = self.operations.write().map_err(Self::poisoned)?;
        if ops.contains_key(&operation.id) {
            return Err(StoreError::Duplicate(operation.id.to_hex()));
        }
        ops.insert(operation.id, operation.clone());
        Ok(())
    }

    async fn get(&self, id: &OperationId) -> Result<Option<Operation>> {
        let ops = self.operations.read().map_err(Self::poisoned)?;
        Ok(ops.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &OperationId,
        to: OperationStatus,
        outcome: Option<OperationOutcome>,
    ) -> Result<Operation> {
        self.update(id, |op| Ok(op.transition(to, outcome, now_millis())?))
    }

    async fn set_operation_tag(&self, id: &OperationId, operation: &str) -> Result<()> {
        self.update(id, |op| {
            op.operation = Some(operation.to_string());
            Ok(())
        })
        .map(|_| ())
    }

    async fn set_upstream_task(&self, id: &OperationId, task_id: &str) -> Result<()> {
        self.update(id, |op| {
            op.upstream_task_id = Some(task_id.to_string());
            Ok(())
        })
        .map(|_| ())
    }

    async fn list_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>> {
        let ops = self.operations.read().map_err(Self::poisoned)?;
        let mut out: Vec<Operation> = ops
            .values()
            .filter(|op| op.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|op| (op.created_at, op.id));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personal_server_core::{Address, ErrorKind};

    fn op() -> Operation {
        Operation::new(8, Address::from_bytes([7u8; 20]))
    }

    #[tokio::test]
    async fn test_insert_get_duplicate() {
        let store = MemoryOperationStore::new();
        let op = op();
        store.insert(&op).await.unwrap();
        assert_eq!(store.get(&op.id).await.unwrap(), Some(op.clone()));
        assert!(matches!(
            store.insert(&op).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.get(&OperationId::generate()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transitions_are_checked() {
        let store = MemoryOperationStore::new();
        let op = op();
        store.insert(&op).await.unwrap();

        let running = store
            .transition(&op.id, OperationStatus::Running, None)
            .await
            .unwrap();
        assert!(running.started_at.is_some());

        let failed = store
            .transition(
                &op.id,
                OperationStatus::Failed,
                Some(OperationOutcome::failure(ErrorKind::Provider, "backend down")),
            )
            .await
            .unwrap();
        assert_eq!(failed.outcome.unwrap().error_kind(), Some(ErrorKind::Provider));

        let err = store
            .transition(&op.id, OperationStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(
            store.get(&op.id).await.unwrap().unwrap().status,
            OperationStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = MemoryOperationStore::new();
        let err = store
            .set_upstream_task(&OperationId::generate(), "task-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
