//! Error types for the store module.

use personal_server_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Outcome encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No operation with this id.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// An operation with this id already exists.
    #[error("operation already exists: {0}")]
    Duplicate(String),

    /// The requested status change is not allowed from the current status.
    #[error(transparent)]
    Transition(#[from] CoreError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task running the query failed.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// The taxonomy kind of this error.
    ///
    /// Backend faults have no pipeline kind of their own and are reported
    /// as `Provider`, the kind for failures of an external backend.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Duplicate(_) => ErrorKind::Validation,
            StoreError::Transition(e) => e.kind(),
            StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::InvalidData(_)
            | StoreError::Migration(_)
            | StoreError::Task(_) => ErrorKind::Provider,
        }
    }

    /// Whether this is a rejected status change.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, StoreError::Transition(CoreError::InvalidTransition { .. }))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
