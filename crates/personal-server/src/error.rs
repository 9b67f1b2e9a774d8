//! Error types for the orchestrator.

use personal_server_chain::ChainError;
use personal_server_core::{AuthorizationError, CoreError, ErrorKind, OperationId};
use personal_server_crypto::CryptoError;
use personal_server_fetch::FetchError;
use personal_server_perms::PermsError;
use personal_server_store::StoreError;
use thiserror::Error;

/// Errors that can occur while accepting or running an operation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed request or unrecoverable signature.
    #[error("request rejected: {0}")]
    Request(#[from] CoreError),

    /// Permission, grant or file resolution failed.
    #[error(transparent)]
    Permission(#[from] PermsError),

    /// The request conflicts with the grant.
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    /// Fetching a file failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Unwrapping a key or decrypting a file failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The blocking decryption task panicked or was cancelled.
    #[error("decryption task failed: {0}")]
    DecryptTask(String),

    /// Chain access failed outside permission resolution.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// No provider is registered for the granted operation.
    #[error("no compute provider registered for operation '{0}'")]
    NoProvider(String),

    /// The compute provider failed.
    #[error("compute provider error: {0:#}")]
    Provider(anyhow::Error),

    /// The compute provider did not answer in time.
    #[error("compute provider timed out after {0:?}")]
    ProviderTimeout(std::time::Duration),

    /// The operation was cancelled while in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// No operation with this id.
    #[error("operation {0} not found")]
    OperationNotFound(OperationId),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Request(e) => e.kind(),
            ServerError::Permission(e) => e.kind(),
            ServerError::Unauthorized(_) => ErrorKind::Authorization,
            ServerError::Fetch(e) => e.kind(),
            ServerError::Crypto(e) => e.kind(),
            ServerError::DecryptTask(_) => ErrorKind::Decryption,
            ServerError::Chain(e) => e.kind(),
            ServerError::Store(e) => e.kind(),
            ServerError::NoProvider(_)
            | ServerError::Provider(_)
            | ServerError::ProviderTimeout(_)
            | ServerError::Cancelled => ErrorKind::Provider,
            ServerError::OperationNotFound(_) => ErrorKind::NotFound,
            ServerError::Config(_) => ErrorKind::Validation,
        }
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, ServerError>;
