//! In-memory contract state.
//!
//! Responses are pushed through the real ABI encoder and decoded again, so
//! code under test sees exactly what a node would return.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use personal_server_chain::abi::encode;
use personal_server_chain::{AbiFunction, AbiValue, ChainClient, ChainError, RegistryFile, Result};
use personal_server_core::{Address, PermissionRecord};

#[derive(Default)]
struct ChainState {
    permissions: HashMap<u64, PermissionRecord>,
    files: HashMap<u64, RegistryFile>,
    keys: HashMap<(u64, Address), String>,
    reverting: bool,
}

/// A [`ChainClient`] backed by hash maps.
///
/// Unknown ids return zeroed structs, as the contracts do.
#[derive(Default)]
pub struct MockChain {
    state: RwLock<ChainState>,
    calls: RwLock<Vec<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_permission(&self, record: PermissionRecord) {
        self.state.write().unwrap().permissions.insert(record.id, record);
    }

    pub fn put_file(&self, file: RegistryFile) {
        self.state.write().unwrap().files.insert(file.id, file);
    }

    /// Record the key for `file_id` wrapped to `account`.
    pub fn put_file_key(&self, file_id: u64, account: Address, wrapped_hex: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .keys
            .insert((file_id, account), wrapped_hex.into());
    }

    pub fn permission(&self, id: u64) -> Option<PermissionRecord> {
        self.state.read().unwrap().permissions.get(&id).cloned()
    }

    /// Make every call revert.
    pub fn set_reverting(&self, reverting: bool) {
        self.state.write().unwrap().reverting = reverting;
    }

    /// Names of the functions called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self, function: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|name| *name == function)
            .count()
    }

    fn respond(&self, function: &AbiFunction, args: &[AbiValue]) -> Result<Vec<AbiValue>> {
        let state = self.state.read().unwrap();
        if state.reverting {
            return Err(ChainError::Reverted(format!("{}: execution reverted", function.name)));
        }

        let value = match function.name {
            "permissions" => {
                let id = args[0].as_u64()?;
                let empty = PermissionRecord {
                    id: 0,
                    grantor: Address::ZERO,
                    nonce: 0,
                    grant_uri: String::new(),
                    grantor_signature: Vec::new(),
                    is_active: false,
                    file_ids: Default::default(),
                };
                let record = state.permissions.get(&id).unwrap_or(&empty);
                AbiValue::Tuple(vec![
                    AbiValue::Uint(record.id as u128),
                    AbiValue::Address(record.grantor),
                    AbiValue::Uint(record.nonce as u128),
                    AbiValue::String(record.grant_uri.clone()),
                    AbiValue::Bytes(record.grantor_signature.clone()),
                    AbiValue::Bool(record.is_active),
                    AbiValue::Array(
                        record
                            .file_ids
                            .iter()
                            .map(|id| AbiValue::Uint(*id as u128))
                            .collect(),
                    ),
                ])
            }
            "files" => {
                let id = args[0].as_u64()?;
                let empty = RegistryFile {
                    id: 0,
                    owner: Address::ZERO,
                    url: String::new(),
                    added_at_block: 0,
                };
                let file = state.files.get(&id).unwrap_or(&empty);
                AbiValue::Tuple(vec![
                    AbiValue::Uint(file.id as u128),
                    AbiValue::Address(file.owner),
                    AbiValue::String(file.url.clone()),
                    AbiValue::Uint(file.added_at_block as u128),
                ])
            }
            "filePermissions" => {
                let key = (args[0].as_u64()?, args[1].as_address()?);
                AbiValue::String(state.keys.get(&key).cloned().unwrap_or_default())
            }
            other => return Err(ChainError::Reverted(format!("{}: no such function", other))),
        };

        function.decode_output(&encode(&[value]))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn call_view(
        &self,
        _contract: &Address,
        function: &AbiFunction,
        args: &[AbiValue],
    ) -> Result<Vec<AbiValue>> {
        // Validates argument types the same way a real call would.
        function.encode_call(args)?;
        self.calls.write().unwrap().push(function.name.to_string());
        self.respond(function, args)
    }
}
