//! # Personal Server Testkit
//!
//! Testing utilities for the personal server.
//!
//! - **Fixtures**: deterministic signers, a test mnemonic, and a complete
//!   [`Scenario`] with a permission, grant and encrypted file
//! - **Mock chain**: [`MockChain`], an in-memory [`ChainClient`] that answers
//!   through the real ABI codec
//! - **Memory content**: [`MemoryContent`], a [`ContentSource`] with a fetch log
//! - **Generators**: proptest strategies for addresses, grants and requests
//!
//! ```rust,ignore
//! use personal_server_testkit::Scenario;
//!
//! let scenario = Scenario::new();
//! let request = scenario.request();
//! ```
//!
//! [`ChainClient`]: personal_server_chain::ChainClient
//! [`ContentSource`]: personal_server_fetch::ContentSource

pub mod chain;
pub mod content;
pub mod fixtures;
pub mod generators;

pub use chain::MockChain;
pub use content::MemoryContent;
pub use fixtures::{
    default_grant, encrypt_for_owner, file_passphrase, file_uri, grant_uri, signer, test_deriver,
    Scenario, SCENARIO_FILE_ID, SCENARIO_GRANTOR, SCENARIO_OPERATION, SCENARIO_PERMISSION_ID,
    SCENARIO_PLAINTEXT, TEST_MNEMONIC,
};
