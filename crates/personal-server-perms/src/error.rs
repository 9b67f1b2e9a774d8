//! Error types for permission resolution.

use personal_server_chain::ChainError;
use personal_server_core::{AuthorizationError, CoreError, ErrorKind};
use personal_server_crypto::CryptoError;
use personal_server_fetch::FetchError;
use thiserror::Error;

/// Errors that can occur while resolving a permission.
#[derive(Debug, Error)]
pub enum PermsError {
    /// No permission with this id exists on chain.
    #[error("permission {0} not found")]
    PermissionNotFound(u64),

    /// No file with this id exists in the registry.
    #[error("file {0} not found")]
    FileNotFound(u64),

    /// The registry holds no key for this file wrapped to this server.
    #[error("no key for file {file_id} has been granted to server {server}")]
    KeyNotGranted { file_id: u64, server: String },

    /// The grant names no files although the configuration requires it.
    #[error("grant for permission {0} does not list its files")]
    GrantFilesMissing(u64),

    /// Resolution produced no files to work on.
    #[error("permission {0} covers no files")]
    EmptyFileSet(u64),

    /// Grant or request was rejected.
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    /// The grant document failed schema validation.
    #[error("invalid grant: {0}")]
    Grant(#[from] CoreError),

    /// Reading contract state failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Fetching the grant document failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Deriving the server address for a file owner failed.
    #[error(transparent)]
    Derivation(#[from] CryptoError),
}

impl PermsError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermsError::PermissionNotFound(_)
            | PermsError::FileNotFound(_)
            | PermsError::KeyNotGranted { .. } => ErrorKind::NotFound,
            PermsError::GrantFilesMissing(_) | PermsError::EmptyFileSet(_) => {
                ErrorKind::Validation
            }
            PermsError::Unauthorized(_) => ErrorKind::Authorization,
            PermsError::Grant(e) => e.kind(),
            PermsError::Chain(e) => e.kind(),
            PermsError::Fetch(e) => e.kind(),
            PermsError::Derivation(e) => e.kind(),
        }
    }
}

/// Result type for permission resolution.
pub type Result<T> = std::result::Result<T, PermsError>;
