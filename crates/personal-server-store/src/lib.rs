//! # Personal Server Store
//!
//! Storage for operation records. Provides the [`OperationStore`] trait with
//! SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`OperationStore`] - The async trait for operation persistence
//! - [`SqliteOperationStore`] - SQLite-based persistent storage
//! - [`MemoryOperationStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use personal_server_core::{Address, Operation};
//! use personal_server_store::{OperationStore, SqliteOperationStore};
//!
//! async fn example() {
//!     let store = SqliteOperationStore::open("operations.db").unwrap();
//!     let op = Operation::new(8, Address::ZERO);
//!     store.insert(&op).await.unwrap();
//! }
//! ```
//!
//! Records are scoped by operation id. Outcomes are stored as CBOR and hold
//! only provider output or an error kind and message.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryOperationStore;
pub use sqlite::SqliteOperationStore;
pub use traits::OperationStore;
