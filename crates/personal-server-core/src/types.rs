//! Records read from chain state.
//!
//! Both records are immutable once read and re-read on every request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// An on-chain permission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: u64,
    pub grantor: Address,
    pub nonce: u64,
    /// Location of the grant document.
    pub grant_uri: String,
    /// The grantor's signature over the grant, as stored on chain.
    pub grantor_signature: Vec<u8>,
    pub is_active: bool,
    pub file_ids: BTreeSet<u64>,
}

/// A registered encrypted file, joined with the key wrapped for this server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: u64,
    pub owner: Address,
    /// Location of the encrypted payload.
    pub content_uri: String,
    /// Hex ECIES blob carrying the file's symmetric key.
    pub wrapped_key: String,
}

impl std::fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRecord")
            .field("file_id", &self.file_id)
            .field("owner", &self.owner)
            .field("content_uri", &self.content_uri)
            .field("wrapped_key", &format_args!("<{} hex chars>", self.wrapped_key.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_debug_hides_key() {
        let record = FileRecord {
            file_id: 1654817,
            owner: Address::from_bytes([1u8; 20]),
            content_uri: "ipfs://bafy".into(),
            wrapped_key: "0xdeadbeefcafebabe".into(),
        };
        let debug = format!("{:?}", record);
        assert!(debug.contains("1654817"));
        assert!(!debug.contains("deadbeef"));
    }
}
