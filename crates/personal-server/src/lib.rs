//! # Personal Server
//!
//! Runs compute operations over a user's encrypted files on behalf of
//! applications the user has granted access to.
//!
//! ## Overview
//!
//! An application sends a [`SignedRequest`] naming an on-chain permission.
//! The [`Orchestrator`]:
//!
//! 1. recovers the requester's address from the request signature,
//! 2. resolves the permission, its grant document and the files it covers,
//! 3. fetches each file, unwraps its key with the server key derived for the
//!    file's owner, and decrypts it,
//! 4. merges runtime parameters under the grant's parameters,
//! 5. dispatches the plaintext to the [`ComputeProvider`] registered for the
//!    granted operation and records the provider's task id.
//!
//! Every accepted request becomes an [`Operation`] with the lifecycle
//! `Pending -> Running -> {Succeeded | Failed | Cancelled}`. Decrypted
//! content is never stored.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use personal_server::{Orchestrator, ProviderRegistry, ServerConfig, SignedRequest};
//!
//! async fn example(providers: ProviderRegistry, request: SignedRequest) {
//!     let config = ServerConfig::from_env().unwrap();
//!     let orchestrator = Arc::new(Orchestrator::from_config(&config, providers).unwrap());
//!     orchestrator.reconcile().await.unwrap();
//!
//!     let op = orchestrator.submit(&request).await.unwrap();
//!     // Later:
//!     let op = orchestrator.refresh(&op.id).await.unwrap();
//!     println!("{}", op.status.as_str());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `personal_server::core` - Addresses, requests, grants, operations
//! - `personal_server::crypto` - Key derivation, key unwrap, payload decryption
//! - `personal_server::fetch` - Gateway content retrieval
//! - `personal_server::chain` - Contract reads
//! - `personal_server::perms` - Permission resolution
//! - `personal_server::store` - Operation records

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod provider;

// Re-export component crates
pub use personal_server_chain as chain;
pub use personal_server_core as core;
pub use personal_server_crypto as crypto;
pub use personal_server_fetch as fetch;
pub use personal_server_perms as perms;
pub use personal_server_store as store;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use params::{check_declared_operation, merge_parameters};
pub use provider::{ComputeProvider, DecryptedFile, ProviderRegistry, ProviderStatus};

// Re-export commonly used core types
pub use personal_server_core::{
    Address, ErrorKind, Operation, OperationId, OperationOutcome, OperationRequest,
    OperationStatus, SignedRequest,
};
