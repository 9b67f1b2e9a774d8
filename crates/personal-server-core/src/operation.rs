//! Operations and their lifecycle.
//!
//! An operation moves `Pending -> Running -> {Succeeded | Failed | Cancelled}`.
//! `Pending` may also fail or be cancelled directly. Terminal states are final.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{CoreError, ErrorKind, Result};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    now_millis() / 1000
}

/// A 16-byte random operation identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub [u8; 16]);

impl OperationId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 16];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.to_hex())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    /// Whether `self -> to` is a legal edge.
    pub const fn can_transition_to(&self, to: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Stable string form, used as the storage encoding.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`OperationStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationStatus::Pending),
            "running" => Some(OperationStatus::Running),
            "succeeded" => Some(OperationStatus::Succeeded),
            "failed" => Some(OperationStatus::Failed),
            "cancelled" => Some(OperationStatus::Cancelled),
            _ => None,
        }
    }
}

/// What an operation finished with.
///
/// Only provider output or an error description is ever recorded; decrypted
/// inputs never reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationOutcome {
    Output { content: serde_json::Value },
    Failure { kind: ErrorKind, message: String },
}

impl OperationOutcome {
    /// Build a failure outcome.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        OperationOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    /// The error kind, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationOutcome::Failure { kind, .. } => Some(*kind),
            OperationOutcome::Output { .. } => None,
        }
    }
}

/// A unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub permission_id: u64,
    pub requester: Address,
    /// The granted operation tag, known once the grant is resolved.
    pub operation: Option<String>,
    pub status: OperationStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub upstream_task_id: Option<String>,
    pub outcome: Option<OperationOutcome>,
}

impl Operation {
    /// Create a new `Pending` operation.
    pub fn new(permission_id: u64, requester: Address) -> Self {
        Self {
            id: OperationId::generate(),
            permission_id,
            requester,
            operation: None,
            status: OperationStatus::Pending,
            created_at: now_millis(),
            started_at: None,
            finished_at: None,
            upstream_task_id: None,
            outcome: None,
        }
    }

    /// Move to `to`, stamping timestamps. Illegal edges leave `self` untouched.
    pub fn transition(
        &mut self,
        to: OperationStatus,
        outcome: Option<OperationOutcome>,
        at: u64,
    ) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        if to == OperationStatus::Running {
            self.started_at = Some(at);
        }
        if to.is_terminal() {
            self.finished_at = Some(at);
            // Cancellation never keeps a partial result.
            self.outcome = if to == OperationStatus::Cancelled {
                None
            } else {
                outcome
            };
        }
        Ok(())
    }

    /// Whether the operation has reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
