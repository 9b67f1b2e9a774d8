//! OperationStore trait: the abstract interface for operation persistence.
//!
//! Stores hold operation records only: status, timestamps, upstream task id
//! and outcome. Request payloads, keys and decrypted content never reach a
//! store.

use async_trait::async_trait;
use personal_server_core::{Operation, OperationId, OperationOutcome, OperationStatus};

use crate::error::Result;

/// Async interface for operation persistence.
///
/// Every record is keyed by its operation id and no call exposes another
/// operation's state. For SQLite, calls run on `spawn_blocking`.
///
/// # Design Notes
///
/// - **Checked transitions**: `transition` applies the lifecycle rules of
///   [`Operation::transition`] under the store's lock, so of two racing
///   terminal transitions exactly one succeeds.
/// - **Cancellation drops outcomes**: a `Cancelled` record never carries one.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert a new operation. Fails with `Duplicate` if the id exists.
    async fn insert(&self, operation: &Operation) -> Result<()>;

    /// Get an operation by id.
    async fn get(&self, id: &OperationId) -> Result<Option<Operation>>;

    /// Move an operation to `to`, returning the updated record.
    async fn transition(
        &self,
        id: &OperationId,
        to: OperationStatus,
        outcome: Option<OperationOutcome>,
    ) -> Result<Operation>;

    /// Record the granted operation tag once the grant is resolved.
    async fn set_operation_tag(&self, id: &OperationId, operation: &str) -> Result<()>;

    /// Record the provider's task id after dispatch.
    async fn set_upstream_task(&self, id: &OperationId, task_id: &str) -> Result<()>;

    /// Operations currently in `status`, oldest first.
    async fn list_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>>;
}
