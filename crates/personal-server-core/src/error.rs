//! Error types for the personal server core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationStatus;

/// The error taxonomy shared by every component.
///
/// Each crate error maps onto exactly one kind, so callers branch on the
/// kind instead of matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Permission or file absent on chain.
    NotFound,
    /// Schema or format violation.
    Validation,
    /// Signature recovery failed.
    Authentication,
    /// Grantee, operation, expiry or file-set mismatch.
    Authorization,
    /// MAC or MDC verification failed.
    Integrity,
    /// Cipher or padding failure.
    Decryption,
    /// Every gateway or the chain endpoint failed.
    Network,
    /// Payload larger than the configured limit.
    SizeLimit,
    /// Compute backend failure.
    Provider,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::Integrity => "INTEGRITY_ERROR",
            ErrorKind::Decryption => "DECRYPTION_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::SizeLimit => "SIZE_LIMIT_ERROR",
            ErrorKind::Provider => "PROVIDER_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature recovery failed")]
    RecoveryFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("grant schema violation: {0}")]
    GrantSchema(String),

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },
}

impl CoreError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidSignature(_) | CoreError::RecoveryFailed => {
                ErrorKind::Authentication
            }
            CoreError::InvalidAddress(_)
            | CoreError::InvalidRequest(_)
            | CoreError::GrantSchema(_)
            | CoreError::InvalidTransition { .. } => ErrorKind::Validation,
        }
    }
}

/// Authorization failures detected while checking a grant.
///
/// Each variant is a distinct, user-visible reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("operation '{0}' is not supported by this server")]
    UnsupportedOperation(String),

    #[error("grantee {grantee} does not match requester {requester}")]
    GranteeMismatch { grantee: String, requester: String },

    #[error("grant expired at {expires} (now {now})")]
    Expired { expires: u64, now: u64 },

    #[error("operation mismatch: grant specifies '{granted}', request specifies '{requested}'")]
    OperationMismatch { granted: String, requested: String },

    #[error("permission {0} has been revoked")]
    PermissionInactive(u64),

    #[error("file {0} is not covered by the on-chain permission")]
    FileNotPermitted(u64),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
