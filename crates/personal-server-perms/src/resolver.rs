//! Permission resolution.
//!
//! Every call re-reads chain state and the grant document. Nothing is cached.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use personal_server_chain::{ChainError, ChainReader, RegistryFile};
use personal_server_core::{
    now_secs, Address, AuthorizationError, FileRecord, GrantDocument, PermissionRecord,
};
use personal_server_crypto::KeyDeriver;
use personal_server_fetch::ContentSource;

use crate::error::{PermsError, Result};

/// Operation tags served when nothing else is configured.
pub const DEFAULT_SUPPORTED_OPERATIONS: &[&str] = &["llm_inference"];

/// Which list of file ids decides what a permission covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAuthority {
    /// The permission record's ids. A grant `files` list must be a subset.
    #[default]
    OnChain,
    /// The grant's `files` list, which must be present and a subset of the
    /// permission record's ids.
    Grant,
}

/// Configuration for the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub supported_operations: Vec<String>,
    pub file_authority: FileAuthority,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            supported_operations: DEFAULT_SUPPORTED_OPERATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            file_authority: FileAuthority::OnChain,
        }
    }
}

impl ResolverConfig {
    pub fn with_supported_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_authority(mut self, authority: FileAuthority) -> Self {
        self.file_authority = authority;
        self
    }
}

/// An authorized permission: the chain record, its grant, and the file ids
/// the requester may touch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPermission {
    pub record: PermissionRecord,
    pub grant: GrantDocument,
    pub file_ids: Vec<u64>,
}

/// Resolves permission ids into authorized grants and file records.
pub struct PermissionResolver {
    chain: ChainReader,
    content: Arc<dyn ContentSource>,
    deriver: Arc<KeyDeriver>,
    config: ResolverConfig,
}

impl PermissionResolver {
    pub fn new(
        chain: ChainReader,
        content: Arc<dyn ContentSource>,
        deriver: Arc<KeyDeriver>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            chain,
            content,
            deriver,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve and authorize `permission_id` for `requester` at the current time.
    pub async fn resolve(&self, permission_id: u64, requester: &Address) -> Result<ResolvedPermission> {
        self.resolve_at(permission_id, requester, now_secs()).await
    }

    /// Resolve and authorize `permission_id` for `requester` at `now` (Unix seconds).
    ///
    /// Fails on the first violated rule: missing record, revoked record,
    /// unreadable or invalid grant, then operation, grantee and expiry
    /// checks, then the file-set rules. No file is read here.
    pub async fn resolve_at(
        &self,
        permission_id: u64,
        requester: &Address,
        now: u64,
    ) -> Result<ResolvedPermission> {
        let record = self.permission_record(permission_id).await?;
        if !record.is_active {
            tracing::warn!(permission_id, "permission is inactive");
            return Err(AuthorizationError::PermissionInactive(permission_id).into());
        }

        let raw = self.content.fetch(&record.grant_uri).await?;
        let grant = GrantDocument::from_json_bytes(&raw)?;

        if let Err(err) = grant.authorize(requester, &self.config.supported_operations, now) {
            tracing::warn!(permission_id, requester = %requester, reason = %err, "grant rejected");
            return Err(err.into());
        }

        let file_ids = self.authorized_files(&record, &grant)?;
        tracing::info!(
            permission_id,
            operation = %grant.operation,
            files = file_ids.len(),
            "permission resolved"
        );

        Ok(ResolvedPermission {
            record,
            grant,
            file_ids,
        })
    }

    async fn permission_record(&self, permission_id: u64) -> Result<PermissionRecord> {
        match self.chain.permission(permission_id).await {
            Ok(record) if record.grantor.is_zero() => {
                Err(PermsError::PermissionNotFound(permission_id))
            }
            Ok(record) => Ok(record),
            Err(ChainError::Reverted(_)) => Err(PermsError::PermissionNotFound(permission_id)),
            Err(err) => Err(err.into()),
        }
    }

    fn authorized_files(&self, record: &PermissionRecord, grant: &GrantDocument) -> Result<Vec<u64>> {
        if let Some(listed) = &grant.files {
            if let Some(missing) = listed.iter().find(|id| !record.file_ids.contains(*id)) {
                return Err(AuthorizationError::FileNotPermitted(*missing).into());
            }
        }

        let ids: Vec<u64> = match self.config.file_authority {
            FileAuthority::OnChain => record.file_ids.iter().copied().collect(),
            FileAuthority::Grant => {
                let listed = grant
                    .files
                    .as_ref()
                    .ok_or(PermsError::GrantFilesMissing(record.id))?;
                let mut ids = Vec::with_capacity(listed.len());
                for id in listed {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
                ids
            }
        };

        if ids.is_empty() {
            return Err(PermsError::EmptyFileSet(record.id));
        }
        Ok(ids)
    }

    /// Look up a file and the key wrapped for the server address derived
    /// from its owner.
    pub async fn file_record(&self, file_id: u64) -> Result<FileRecord> {
        let file = self.registry_file(file_id).await?;
        let server = self.deriver.derive(&file.owner)?.address;
        self.wrapped_key(file, server).await
    }

    /// Look up every file of a resolved permission, concurrently.
    ///
    /// The server address is derived once per distinct owner.
    pub async fn resolve_files(&self, resolved: &ResolvedPermission) -> Result<Vec<FileRecord>> {
        let files =
            try_join_all(resolved.file_ids.iter().map(|id| self.registry_file(*id))).await?;

        let mut servers: HashMap<Address, Address> = HashMap::new();
        let mut lookups = Vec::with_capacity(files.len());
        for file in files {
            let server = match servers.entry(file.owner) {
                Entry::Occupied(slot) => *slot.get(),
                Entry::Vacant(slot) => *slot.insert(self.deriver.derive(&file.owner)?.address),
            };
            lookups.push(self.wrapped_key(file, server));
        }
        try_join_all(lookups).await
    }

    async fn registry_file(&self, file_id: u64) -> Result<RegistryFile> {
        match self.chain.file(file_id).await {
            Ok(file) if file.owner.is_zero() => Err(PermsError::FileNotFound(file_id)),
            Ok(file) => Ok(RegistryFile { id: file_id, ..file }),
            Err(ChainError::Reverted(_)) => Err(PermsError::FileNotFound(file_id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn wrapped_key(&self, file: RegistryFile, server: Address) -> Result<FileRecord> {
        let file_id = file.id;
        let wrapped_key = match self.chain.file_key(file_id, &server).await {
            Ok(key) => key,
            Err(ChainError::Reverted(_)) => String::new(),
            Err(err) => return Err(err.into()),
        };
        if wrapped_key.trim().is_empty() {
            return Err(PermsError::KeyNotGranted {
                file_id,
                server: server.to_checksum(),
            });
        }

        tracing::debug!(file_id, owner = %file.owner, "file resolved");
        Ok(FileRecord {
            file_id,
            owner: file.owner,
            content_uri: file.url,
            wrapped_key,
        })
    }
}
