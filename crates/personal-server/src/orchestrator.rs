//! The operation orchestrator.
//!
//! Ties request authentication, permission resolution, file decryption and
//! provider dispatch together, and records each operation's lifecycle.
//!
//! Decrypted content and unwrapped keys live only inside one pipeline run
//! and are wiped when it returns.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::watch;

use personal_server_core::{
    Address, ErrorKind, FileRecord, Operation, OperationId, OperationOutcome, OperationRequest,
    OperationStatus, SignedRequest,
};
use personal_server_chain::{ChainReader, JsonRpcChainClient};
use personal_server_crypto::{
    decode_hex_blob, decrypt_payload_with, unwrap_key, ContainerLimits, DerivedKeyMaterial,
    KeyDeriver,
};
use personal_server_fetch::{ContentFetcher, ContentSource};
use personal_server_perms::PermissionResolver;
use personal_server_store::{MemoryOperationStore, OperationStore, SqliteOperationStore, StoreError};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::params::{check_declared_operation, merge_parameters};
use crate::provider::{DecryptedFile, ProviderRegistry, ProviderStatus};

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on each provider call.
    pub provider_timeout: Duration,
    /// Work bounds for decrypting file containers.
    pub container_limits: ContainerLimits,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(300),
            container_limits: ContainerLimits::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_container_limits(mut self, limits: ContainerLimits) -> Self {
        self.container_limits = limits;
        self
    }
}

/// Drives operations from signed request to provider dispatch.
pub struct Orchestrator {
    resolver: PermissionResolver,
    content: Arc<dyn ContentSource>,
    deriver: Arc<KeyDeriver>,
    providers: ProviderRegistry,
    store: Arc<dyn OperationStore>,
    config: OrchestratorConfig,
    /// Cancellation signals for pipelines still running, by operation id.
    inflight: Mutex<HashMap<OperationId, watch::Sender<bool>>>,
}

/// Resolves once the signal is raised. Pends forever if the sender is gone.
async fn cancelled(mut signal: watch::Receiver<bool>) {
    if signal.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The server keypair for each file, derived once per distinct owner.
fn server_keys(
    deriver: &KeyDeriver,
    files: &[FileRecord],
) -> Result<Vec<Arc<DerivedKeyMaterial>>> {
    let mut by_owner: HashMap<Address, Arc<DerivedKeyMaterial>> = HashMap::new();
    let mut keys = Vec::with_capacity(files.len());
    for file in files {
        let key = match by_owner.entry(file.owner) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => slot.insert(Arc::new(deriver.derive(&file.owner)?)).clone(),
        };
        keys.push(key);
    }
    Ok(keys)
}

/// Held for the length of one run.
///
/// Drops the operation's cancellation signal. If the run is dropped before
/// its outcome is recorded, the record is cancelled in the background.
struct RunGuard<'a> {
    orchestrator: &'a Orchestrator,
    id: OperationId,
    recorded: bool,
}

impl<'a> RunGuard<'a> {
    fn new(orchestrator: &'a Orchestrator, id: OperationId) -> Self {
        Self {
            orchestrator,
            id,
            recorded: false,
        }
    }

    fn mark_recorded(&mut self) {
        self.recorded = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.signals().remove(&self.id);
        if self.recorded {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let id = self.id;
        let store = self.orchestrator.store.clone();
        tracing::warn!(operation_id = %id, "operation abandoned before completion");
        runtime.spawn(async move {
            match store.transition(&id, OperationStatus::Cancelled, None).await {
                Ok(_) => {}
                Err(err) if err.is_invalid_transition() => {}
                Err(err) => {
                    tracing::error!(operation_id = %id, error = %err, "abandoned operation could not be recorded")
                }
            }
        });
    }
}

impl Orchestrator {
    pub fn new(
        resolver: PermissionResolver,
        content: Arc<dyn ContentSource>,
        deriver: Arc<KeyDeriver>,
        providers: ProviderRegistry,
        store: Arc<dyn OperationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            resolver,
            content,
            deriver,
            providers,
            store,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the production components described by `config`.
    ///
    /// Chain state is read over JSON-RPC, content through the configured
    /// gateways. Operation records go to SQLite when a database path is set;
    /// call [`reconcile`](Self::reconcile) before serving requests.
    pub fn from_config(config: &ServerConfig, providers: ProviderRegistry) -> Result<Self> {
        config.validate()?;
        let deriver = Arc::new(KeyDeriver::new(
            &config.wallet_mnemonic,
            &config.mnemonic_language,
        )?);

        let chain_config = config.chain_config()?;
        let client = Arc::new(JsonRpcChainClient::new(
            chain_config.rpc_url.clone(),
            chain_config.request_timeout,
        )?);
        let reader = ChainReader::from_config(client, &chain_config);

        let content: Arc<dyn ContentSource> = Arc::new(ContentFetcher::new(config.fetch_config())?);
        let resolver = PermissionResolver::new(
            reader,
            content.clone(),
            deriver.clone(),
            config.resolver_config(),
        );

        let store: Arc<dyn OperationStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteOperationStore::open(path)?),
            None => Arc::new(MemoryOperationStore::new()),
        };

        for operation in &config.supported_operations {
            if providers.get(operation).is_none() {
                tracing::warn!(operation = %operation, "supported operation has no provider");
            }
        }
        tracing::info!(
            chain_id = chain_config.chain_id,
            rpc_url = %chain_config.rpc_url,
            operations = ?providers.operations(),
            "orchestrator configured"
        );

        Ok(Self::new(
            resolver,
            content,
            deriver,
            providers,
            store,
            config.orchestrator_config(),
        ))
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Number of pipelines currently running.
    pub fn in_flight(&self) -> usize {
        self.signals().len()
    }

    fn signals(&self) -> MutexGuard<'_, HashMap<OperationId, watch::Sender<bool>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle records a previous process left unfinished.
    ///
    /// Pending and running operations that never reached a provider fail
    /// with a `Provider` outcome. Dispatched ones stay running; their result
    /// is picked up by [`refresh`](Self::refresh). Returns the failed ids.
    pub async fn reconcile(&self) -> Result<Vec<OperationId>> {
        let mut failed = Vec::new();
        for status in [OperationStatus::Pending, OperationStatus::Running] {
            for op in self.store.list_by_status(status).await? {
                if op.upstream_task_id.is_some() || self.signals().contains_key(&op.id) {
                    continue;
                }
                let outcome =
                    OperationOutcome::failure(ErrorKind::Provider, "interrupted before dispatch");
                match self
                    .store
                    .transition(&op.id, OperationStatus::Failed, Some(outcome))
                    .await
                {
                    Ok(_) => failed.push(op.id),
                    Err(err) if err.is_invalid_transition() => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        if !failed.is_empty() {
            tracing::warn!(count = failed.len(), "interrupted operations marked failed");
        }
        Ok(failed)
    }

    /// Run the whole pipeline inline.
    ///
    /// Returns the recorded operation: `Running` with an upstream task id on
    /// dispatch, otherwise `Failed` or `Cancelled`. Requests that cannot be
    /// decoded or authenticated are returned as errors and never recorded.
    pub async fn execute(&self, request: &SignedRequest) -> Result<Operation> {
        let (op, body, signal) = self.accept(request).await?;
        self.run(op.id, op.requester, body, signal).await
    }

    /// Accept a request and run its pipeline in the background.
    ///
    /// Returns the `Pending` operation as soon as it is recorded.
    pub async fn submit(self: &Arc<Self>, request: &SignedRequest) -> Result<Operation> {
        let (op, body, signal) = self.accept(request).await?;
        let this = Arc::clone(self);
        let (id, requester) = (op.id, op.requester);
        tokio::spawn(async move {
            if let Err(err) = this.run(id, requester, body, signal).await {
                tracing::error!(operation_id = %id, error = %err, "operation could not be recorded");
            }
        });
        Ok(op)
    }

    /// The recorded state of an operation.
    pub async fn get(&self, id: &OperationId) -> Result<Operation> {
        self.store
            .get(id)
            .await?
            .ok_or(ServerError::OperationNotFound(*id))
    }

    /// Poll the provider for a dispatched operation and record its result.
    pub async fn refresh(&self, id: &OperationId) -> Result<Operation> {
        let op = self.get(id).await?;
        if op.is_terminal() {
            return Ok(op);
        }
        let (Some(task_id), Some(operation)) = (&op.upstream_task_id, &op.operation) else {
            return Ok(op);
        };
        let provider = self
            .providers
            .get(operation)
            .ok_or_else(|| ServerError::NoProvider(operation.clone()))?;

        let status = tokio::time::timeout(self.config.provider_timeout, provider.poll(task_id))
            .await
            .map_err(|_| ServerError::ProviderTimeout(self.config.provider_timeout))?
            .map_err(ServerError::Provider)?;

        let (to, outcome) = match status {
            ProviderStatus::Pending | ProviderStatus::Running => return Ok(op),
            ProviderStatus::Succeeded(content) => (
                OperationStatus::Succeeded,
                Some(OperationOutcome::Output { content }),
            ),
            ProviderStatus::Failed(message) => (
                OperationStatus::Failed,
                Some(OperationOutcome::failure(ErrorKind::Provider, message)),
            ),
            ProviderStatus::Cancelled => (OperationStatus::Cancelled, None),
        };

        match self.store.transition(id, to, outcome).await {
            Ok(updated) => {
                tracing::info!(operation_id = %id, status = updated.status.as_str(), "operation finished");
                Ok(updated)
            }
            // Someone else finished it first.
            Err(err) if err.is_invalid_transition() => self.get(id).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Cancel a pending or running operation.
    ///
    /// Stops an in-flight pipeline and asks the provider to stop a
    /// dispatched task. Terminal operations cannot be cancelled.
    pub async fn cancel(&self, id: &OperationId) -> Result<Operation> {
        let op = self
            .store
            .transition(id, OperationStatus::Cancelled, None)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => ServerError::OperationNotFound(*id),
                other => other.into(),
            })?;

        if let Some(signal) = self.signals().get(id) {
            let _ = signal.send(true);
        }

        if let (Some(task_id), Some(operation)) = (&op.upstream_task_id, &op.operation) {
            self.cancel_upstream(operation, task_id).await;
        }

        tracing::info!(operation_id = %id, "operation cancelled");
        Ok(op)
    }

    async fn cancel_upstream(&self, operation: &str, task_id: &str) {
        let Some(provider) = self.providers.get(operation) else {
            return;
        };
        match tokio::time::timeout(self.config.provider_timeout, provider.cancel(task_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(task_id, error = %err, "provider cancel failed"),
            Err(_) => tracing::warn!(task_id, "provider cancel timed out"),
        }
    }

    /// Decode, authenticate and record a request.
    async fn accept(
        &self,
        request: &SignedRequest,
    ) -> Result<(Operation, OperationRequest, watch::Receiver<bool>)> {
        let body = request.decode()?;
        let requester = request.recover_signer()?;

        let op = Operation::new(body.permission_id, requester);
        self.store.insert(&op).await?;

        let (tx, rx) = watch::channel(false);
        self.signals().insert(op.id, tx);

        tracing::info!(
            operation_id = %op.id,
            permission_id = body.permission_id,
            requester = %requester,
            "operation accepted"
        );
        Ok((op, body, rx))
    }

    /// Run the pipeline for an accepted operation and record how it ended.
    ///
    /// Only storage failures are returned as errors.
    async fn run(
        &self,
        id: OperationId,
        requester: Address,
        body: OperationRequest,
        signal: watch::Receiver<bool>,
    ) -> Result<Operation> {
        let mut guard = RunGuard::new(self, id);
        let result = tokio::select! {
            result = self.pipeline(id, requester, &body) => result,
            _ = cancelled(signal) => Err(ServerError::Cancelled),
        };

        match result {
            Ok(task_id) => {
                guard.mark_recorded();
                let op = self.get(&id).await?;
                if op.status == OperationStatus::Cancelled {
                    // Cancelled while dispatching: stop the task we just started.
                    if let Some(operation) = &op.operation {
                        self.cancel_upstream(operation, &task_id).await;
                    }
                }
                Ok(op)
            }
            Err(ServerError::Cancelled) => {
                guard.mark_recorded();
                self.get(&id).await
            }
            Err(ServerError::Store(err)) if err.is_invalid_transition() => {
                guard.mark_recorded();
                self.get(&id).await
            }
            Err(err) => {
                tracing::warn!(operation_id = %id, kind = %err.kind(), error = %err, "operation failed");
                let outcome = OperationOutcome::failure(err.kind(), err.to_string());
                let recorded = self
                    .store
                    .transition(&id, OperationStatus::Failed, Some(outcome))
                    .await;
                guard.mark_recorded();
                match recorded {
                    Ok(op) => Ok(op),
                    Err(e) if e.is_invalid_transition() => self.get(&id).await,
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Resolve, decrypt and dispatch. Returns the provider's task id.
    async fn pipeline(
        &self,
        id: OperationId,
        requester: Address,
        body: &OperationRequest,
    ) -> Result<String> {
        self.store
            .transition(&id, OperationStatus::Running, None)
            .await?;

        let resolved = self.resolver.resolve(body.permission_id, &requester).await?;
        let operation = resolved.grant.operation.clone();
        self.store.set_operation_tag(&id, &operation).await?;

        check_declared_operation(body.operation.as_deref(), &operation)?;
        let provider = self
            .providers
            .get(&operation)
            .ok_or_else(|| ServerError::NoProvider(operation.clone()))?;

        let files = self.resolver.resolve_files(&resolved).await?;
        let keys = server_keys(&self.deriver, &files)?;
        let contents =
            try_join_all(files.iter().zip(keys).map(|(file, key)| self.open_file(file, key)))
                .await?;
        let parameters = merge_parameters(body.parameters.as_ref(), &resolved.grant.parameters);

        let dispatched = tokio::time::timeout(
            self.config.provider_timeout,
            provider.dispatch(&operation, &contents, &parameters),
        )
        .await;
        drop(contents);

        let task_id = dispatched
            .map_err(|_| ServerError::ProviderTimeout(self.config.provider_timeout))?
            .map_err(ServerError::Provider)?;
        self.store.set_upstream_task(&id, &task_id).await?;

        tracing::info!(operation_id = %id, operation = %operation, task_id = %task_id, "operation dispatched");
        Ok(task_id)
    }

    /// Fetch, unwrap the key for, and decrypt one file.
    ///
    /// Key unwrapping and decryption run on the blocking pool.
    async fn open_file(
        &self,
        file: &FileRecord,
        server_key: Arc<DerivedKeyMaterial>,
    ) -> Result<DecryptedFile> {
        let ciphertext = self.content.fetch(&file.content_uri).await?;
        let blob = decode_hex_blob(&file.wrapped_key)?;
        let limits = self.config.container_limits;

        let content = tokio::task::spawn_blocking(move || {
            let passphrase = unwrap_key(&blob, server_key.private_key())?;
            decrypt_payload_with(&ciphertext, &passphrase, &limits)
        })
        .await
        .map_err(|e| ServerError::DecryptTask(e.to_string()))??;

        tracing::debug!(file_id = file.file_id, bytes = content.len(), "file decrypted");
        Ok(DecryptedFile {
            file_id: file.file_id,
            content,
        })
    }
}
