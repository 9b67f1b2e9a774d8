//! Typed views over the permissions and registry contracts.
//!
//! Each view decodes into exactly one struct and fails at the boundary if
//! the returned tuple has any other shape.

use std::collections::BTreeSet;
use std::sync::Arc;

use personal_server_core::{Address, PermissionRecord};

use crate::abi::{AbiFunction, AbiType, AbiValue};
use crate::client::ChainClient;
use crate::config::ChainConfig;
use crate::error::{ChainError, Result};

fn permission_tuple() -> AbiType {
    AbiType::Tuple(vec![
        AbiType::Uint256,
        AbiType::Address,
        AbiType::Uint256,
        AbiType::String,
        AbiType::Bytes,
        AbiType::Bool,
        AbiType::Array(Box::new(AbiType::Uint256)),
    ])
}

fn file_tuple() -> AbiType {
    AbiType::Tuple(vec![
        AbiType::Uint256,
        AbiType::Address,
        AbiType::String,
        AbiType::Uint256,
    ])
}

/// `permissions(uint256) -> (uint256,address,uint256,string,bytes,bool,uint256[])`
pub fn permissions_fn() -> AbiFunction {
    AbiFunction::new("permissions", vec![AbiType::Uint256], vec![permission_tuple()])
}

/// `files(uint256) -> (uint256,address,string,uint256)`
pub fn files_fn() -> AbiFunction {
    AbiFunction::new("files", vec![AbiType::Uint256], vec![file_tuple()])
}

/// `filePermissions(uint256,address) -> string`
pub fn file_permissions_fn() -> AbiFunction {
    AbiFunction::new(
        "filePermissions",
        vec![AbiType::Uint256, AbiType::Address],
        vec![AbiType::String],
    )
}

/// A file as stored in the registry, before its key is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryFile {
    pub id: u64,
    pub owner: Address,
    pub url: String,
    pub added_at_block: u64,
}

fn single(mut values: Vec<AbiValue>, what: &str) -> Result<AbiValue> {
    if values.len() != 1 {
        return Err(ChainError::Decode(format!(
            "{} returned {} values, expected 1",
            what,
            values.len()
        )));
    }
    Ok(values.remove(0))
}

fn fields<const N: usize>(value: AbiValue, what: &str) -> Result<[AbiValue; N]> {
    let items = value.into_tuple()?;
    let len = items.len();
    items
        .try_into()
        .map_err(|_| ChainError::Decode(format!("{} has {} fields, expected {}", what, len, N)))
}

/// Decode the `permissions` return value.
pub fn decode_permission(values: Vec<AbiValue>) -> Result<PermissionRecord> {
    let [id, grantor, nonce, grant, signature, is_active, file_ids] =
        fields::<7>(single(values, "permissions")?, "permission")?;

    let file_ids = file_ids
        .into_array()?
        .iter()
        .map(AbiValue::as_u64)
        .collect::<Result<BTreeSet<_>>>()?;

    Ok(PermissionRecord {
        id: id.as_u64()?,
        grantor: grantor.as_address()?,
        nonce: nonce.as_u64()?,
        grant_uri: grant.into_string()?,
        grantor_signature: signature.into_bytes()?,
        is_active: is_active.as_bool()?,
        file_ids,
    })
}

/// Decode the `files` return value.
pub fn decode_file(values: Vec<AbiValue>) -> Result<RegistryFile> {
    let [id, owner, url, added_at_block] = fields::<4>(single(values, "files")?, "file")?;
    Ok(RegistryFile {
        id: id.as_u64()?,
        owner: owner.as_address()?,
        url: url.into_string()?,
        added_at_block: added_at_block.as_u64()?,
    })
}

/// Read access to the two contracts the server depends on.
#[derive(Clone)]
pub struct ChainReader {
    client: Arc<dyn ChainClient>,
    data_permissions: Address,
    data_registry: Address,
}

impl ChainReader {
    pub fn new(client: Arc<dyn ChainClient>, data_permissions: Address, data_registry: Address) -> Self {
        Self {
            client,
            data_permissions,
            data_registry,
        }
    }

    /// Reader bound to the contracts named in `config`.
    pub fn from_config(client: Arc<dyn ChainClient>, config: &ChainConfig) -> Self {
        Self::new(client, config.data_permissions, config.data_registry)
    }

    /// The permission record with `id`.
    pub async fn permission(&self, id: u64) -> Result<PermissionRecord> {
        let values = self
            .client
            .call_view(
                &self.data_permissions,
                &permissions_fn(),
                &[AbiValue::Uint(id as u128)],
            )
            .await?;
        decode_permission(values)
    }

    /// The registry entry for `file_id`.
    pub async fn file(&self, file_id: u64) -> Result<RegistryFile> {
        let values = self
            .client
            .call_view(
                &self.data_registry,
                &files_fn(),
                &[AbiValue::Uint(file_id as u128)],
            )
            .await?;
        decode_file(values)
    }

    /// The key for `file_id` wrapped to `account`. Empty when none was granted.
    pub async fn file_key(&self, file_id: u64, account: &Address) -> Result<String> {
        let values = self
            .client
            .call_view(
                &self.data_registry,
                &file_permissions_fn(),
                &[AbiValue::Uint(file_id as u128), AbiValue::Address(*account)],
            )
            .await?;
        single(values, "filePermissions")?.into_string()
    }
}

impl std::fmt::Debug for ChainReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainReader")
            .field("data_permissions", &self.data_permissions)
            .field("data_registry", &self.data_registry)
            .finish_non_exhaustive()
    }
}
