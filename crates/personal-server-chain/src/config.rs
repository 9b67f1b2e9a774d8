//! Known chains and contract deployments.

use std::time::Duration;

use personal_server_core::Address;

use crate::error::{ChainError, Result};

pub const MOKSHA_CHAIN_ID: u64 = 14800;
pub const MAINNET_CHAIN_ID: u64 = 1480;

const DATA_PERMISSIONS: [u8; 20] = [
    0x31, 0xfb, 0x1d, 0x48, 0xf6, 0xb2, 0x26, 0x5a, 0x4c, 0xad, 0x51, 0x6b, 0xc3, 0x9e, 0x96,
    0xa1, 0x8f, 0xb7, 0xc8, 0xde,
];
const DATA_REGISTRY: [u8; 20] = [
    0x8c, 0x87, 0x88, 0xf9, 0x83, 0x85, 0xf6, 0xba, 0x1a, 0xdd, 0x42, 0x34, 0xe5, 0x51, 0xab,
    0xba, 0x0f, 0x82, 0xcb, 0x7c,
];

/// Where to read chain state from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Contract holding permission records.
    pub data_permissions: Address,
    /// Contract holding file records and wrapped keys.
    pub data_registry: Address,
    pub request_timeout: Duration,
}

impl ChainConfig {
    /// Moksha testnet.
    pub fn moksha() -> Self {
        Self {
            chain_id: MOKSHA_CHAIN_ID,
            rpc_url: "https://rpc.moksha.vana.org".into(),
            data_permissions: Address::from_bytes(DATA_PERMISSIONS),
            data_registry: Address::from_bytes(DATA_REGISTRY),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Mainnet.
    pub fn mainnet() -> Self {
        Self {
            chain_id: MAINNET_CHAIN_ID,
            rpc_url: "https://rpc.vana.org".into(),
            ..Self::moksha()
        }
    }

    /// Preset for a known chain id.
    pub fn for_chain(chain_id: u64) -> Result<Self> {
        match chain_id {
            MOKSHA_CHAIN_ID => Ok(Self::moksha()),
            MAINNET_CHAIN_ID => Ok(Self::mainnet()),
            other => Err(ChainError::UnsupportedChain(other)),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::moksha()
    }
}
