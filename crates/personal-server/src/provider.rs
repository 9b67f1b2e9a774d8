//! Compute providers and the registry that routes operations to them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

/// A decrypted file handed to a provider.
///
/// The content is wiped when the value is dropped.
pub struct DecryptedFile {
    pub file_id: u64,
    pub content: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for DecryptedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedFile")
            .field("file_id", &self.file_id)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .finish()
    }
}

/// What a provider reports for a dispatched task.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStatus {
    Pending,
    Running,
    Succeeded(Value),
    Failed(String),
    Cancelled,
}

impl ProviderStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ProviderStatus::Succeeded(_) | ProviderStatus::Failed(_) | ProviderStatus::Cancelled
        )
    }
}

/// A compute backend able to run one or more operation types.
///
/// Implementations must be thread-safe (Send + Sync). Providers must not
/// retain `contents` beyond the `dispatch` call.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Start a task and return its id.
    async fn dispatch(
        &self,
        operation: &str,
        contents: &[DecryptedFile],
        parameters: &Map<String, Value>,
    ) -> anyhow::Result<String>;

    /// Current status of a task.
    async fn poll(&self, task_id: &str) -> anyhow::Result<ProviderStatus>;

    /// Stop a task.
    async fn cancel(&self, task_id: &str) -> anyhow::Result<()>;
}

/// Maps operation tags to providers. Populated at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ComputeProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `operation` to `provider`, replacing any earlier registration.
    pub fn register(&mut self, operation: impl Into<String>, provider: Arc<dyn ComputeProvider>) {
        self.providers.insert(operation.into(), provider);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, operation: impl Into<String>, provider: Arc<dyn ComputeProvider>) -> Self {
        self.register(operation, provider);
        self
    }

    pub fn get(&self, operation: &str) -> Option<Arc<dyn ComputeProvider>> {
        self.providers.get(operation).cloned()
    }

    /// Registered operation tags, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut ops: Vec<String> = self.providers.keys().cloned().collect();
        ops.sort();
        ops
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}
