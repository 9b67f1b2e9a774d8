//! Error types for content retrieval.

use std::fmt;

use personal_server_core::ErrorKind;
use thiserror::Error;

/// Why a single gateway attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    NotFound,
    RateLimited,
    Generic,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::Timeout => "timeout",
            FailureClass::NotFound => "not found",
            FailureClass::RateLimited => "rate limited",
            FailureClass::Generic => "request failed",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while fetching content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URI is empty or uses an unsupported scheme.
    #[error("invalid content uri: {0}")]
    InvalidUri(String),

    /// The payload is larger than allowed.
    #[error("payload too large: {size} bytes (max {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// Every candidate URL failed.
    #[error("all {attempts} sources failed for {uri}; last failure: {last}: {message}")]
    Exhausted {
        uri: String,
        attempts: usize,
        last: FailureClass,
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidUri(_) => ErrorKind::Validation,
            FetchError::TooLarge { .. } => ErrorKind::SizeLimit,
            FetchError::Exhausted { .. } | FetchError::Client(_) => ErrorKind::Network,
        }
    }

    /// The last failure class, when all sources were exhausted.
    pub fn last_failure(&self) -> Option<FailureClass> {
        match self {
            FetchError::Exhausted { last, .. } => Some(*last),
            _ => None,
        }
    }
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
