//! # Personal Server Core
//!
//! Pure primitives for the personal server: addresses, request signatures,
//! grant documents, chain records and the operation state machine.
//!
//! This crate contains no I/O. Everything here is computation over data
//! that other crates fetch.
//!
//! ## Key Types
//!
//! - [`Address`] - 20-byte account address
//! - [`SignedRequest`] - A request body plus the signature that authenticates it
//! - [`GrantDocument`] - The off-chain description of what a grantee may do
//! - [`PermissionRecord`] / [`FileRecord`] - Records read from chain state
//! - [`Operation`] - A unit of requested work and its lifecycle
//! - [`ErrorKind`] - The error taxonomy shared across crates

pub mod address;
pub mod crypto;
pub mod error;
pub mod grant;
pub mod operation;
pub mod request;
pub mod types;

pub use address::{keccak256, Address};
pub use crypto::{personal_message_hash, recover_address, Keypair, RecoverableSignature};
pub use error::{AuthorizationError, CoreError, ErrorKind, Result};
pub use grant::GrantDocument;
pub use operation::{
    now_millis, now_secs, Operation, OperationId, OperationOutcome, OperationStatus,
};
pub use request::{OperationRequest, SignedRequest};
pub use types::{FileRecord, PermissionRecord};
