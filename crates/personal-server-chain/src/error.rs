//! Error types for chain access.

use personal_server_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur while reading contract state.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node could not be reached or timed out.
    #[error("chain transport error: {0}")]
    Transport(String),

    /// The call reverted or the node returned an error object.
    #[error("contract call reverted: {0}")]
    Reverted(String),

    /// Arguments did not match the function's inputs.
    #[error("abi encode error: {0}")]
    Encode(String),

    /// Return data did not match the function's outputs.
    #[error("abi decode error: {0}")]
    Decode(String),

    /// The configured chain id is not known.
    #[error("unsupported chain id {0}")]
    UnsupportedChain(u64),
}

impl ChainError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Transport(_) => ErrorKind::Network,
            ChainError::Reverted(_) => ErrorKind::NotFound,
            ChainError::Encode(_) | ChainError::Decode(_) | ChainError::UnsupportedChain(_) => {
                ErrorKind::Validation
            }
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
