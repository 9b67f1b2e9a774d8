//! # Personal Server Chain
//!
//! Read-only access to the permissions and data-registry contracts.
//!
//! - [`abi`] encodes calldata and decodes return data for the few Solidity
//!   types the contract views use.
//! - [`ChainClient`] is the seam: `call_view(contract, function, args)`.
//!   [`JsonRpcChainClient`] implements it with `eth_call` over HTTP.
//! - [`ChainReader`] decodes each view into one canonical struct.

pub mod abi;
pub mod client;
pub mod config;
pub mod contracts;
pub mod error;

pub use abi::{AbiFunction, AbiType, AbiValue};
pub use client::{ChainClient, JsonRpcChainClient};
pub use config::{ChainConfig, MAINNET_CHAIN_ID, MOKSHA_CHAIN_ID};
pub use contracts::{
    decode_file, decode_permission, file_permissions_fn, files_fn, permissions_fn, ChainReader,
    RegistryFile,
};
pub use error::{ChainError, Result};
