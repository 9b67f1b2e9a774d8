//! Shared helpers for the orchestrator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use personal_server::chain::ChainReader;
use personal_server::perms::{PermissionResolver, ResolverConfig};
use personal_server::store::{MemoryOperationStore, OperationStore};
use personal_server::{
    Address, ComputeProvider, DecryptedFile, Operation, OperationId, Orchestrator,
    OrchestratorConfig, ProviderRegistry, ProviderStatus,
};
use personal_server_testkit::{Scenario, SCENARIO_OPERATION};

/// What a provider received for one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub task_id: String,
    pub operation: String,
    pub files: Vec<(u64, Vec<u8>)>,
    pub parameters: Map<String, Value>,
}

/// A scripted compute provider.
///
/// Dispatches start as `Running`; tests finish them with [`complete`] or
/// [`fail`].
///
/// [`complete`]: MockProvider::complete
/// [`fail`]: MockProvider::fail
#[derive(Default)]
pub struct MockProvider {
    next_task: AtomicU64,
    dispatches: Mutex<Vec<Dispatch>>,
    statuses: Mutex<HashMap<String, ProviderStatus>>,
    cancelled: Mutex<Vec<String>>,
    dispatch_error: Mutex<Option<String>>,
    dispatch_delay: Mutex<Option<Duration>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later dispatch fail with `message`.
    pub fn fail_dispatch(&self, message: &str) {
        *self.dispatch_error.lock().unwrap() = Some(message.to_string());
    }

    /// Hold every later dispatch for `delay`.
    pub fn delay_dispatch(&self, delay: Duration) {
        *self.dispatch_delay.lock().unwrap() = Some(delay);
    }

    pub fn complete(&self, task_id: &str, output: Value) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), ProviderStatus::Succeeded(output));
    }

    pub fn fail(&self, task_id: &str, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), ProviderStatus::Failed(message.to_string()));
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    async fn dispatch(
        &self,
        operation: &str,
        contents: &[DecryptedFile],
        parameters: &Map<String, Value>,
    ) -> anyhow::Result<String> {
        let delay = *self.dispatch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.dispatch_error.lock().unwrap().clone() {
            anyhow::bail!(message);
        }

        let task_id = format!("task-{}", self.next_task.fetch_add(1, Ordering::SeqCst) + 1);
        self.dispatches.lock().unwrap().push(Dispatch {
            task_id: task_id.clone(),
            operation: operation.to_string(),
            files: contents
                .iter()
                .map(|file| (file.file_id, file.content.to_vec()))
                .collect(),
            parameters: parameters.clone(),
        });
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.clone(), ProviderStatus::Running);
        Ok(task_id)
    }

    async fn poll(&self, task_id: &str) -> anyhow::Result<ProviderStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown task {}", task_id))
    }

    async fn cancel(&self, task_id: &str) -> anyhow::Result<()> {
        self.cancelled.lock().unwrap().push(task_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), ProviderStatus::Cancelled);
        Ok(())
    }
}

/// Install a fmt subscriber that writes through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Everything a test needs to drive and inspect one orchestrator.
pub struct Harness {
    pub scenario: Scenario,
    pub provider: Arc<MockProvider>,
    pub store: Arc<dyn OperationStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    /// The scenario world with a provider for `llm_inference` and an
    /// in-memory store.
    pub fn new() -> Self {
        Self::build(Scenario::new(), Arc::new(MemoryOperationStore::new()), OrchestratorConfig::default())
    }

    pub fn with_scenario(scenario: Scenario) -> Self {
        Self::build(scenario, Arc::new(MemoryOperationStore::new()), OrchestratorConfig::default())
    }

    pub fn build(
        scenario: Scenario,
        store: Arc<dyn OperationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        init_tracing();
        let provider = MockProvider::new();
        let providers = ProviderRegistry::new().with(SCENARIO_OPERATION, provider.clone());
        let orchestrator = Arc::new(orchestrator(&scenario, providers, store.clone(), config));
        Self {
            scenario,
            provider,
            store,
            orchestrator,
        }
    }
}

/// An orchestrator over the scenario's mock chain and content.
pub fn orchestrator(
    scenario: &Scenario,
    providers: ProviderRegistry,
    store: Arc<dyn OperationStore>,
    config: OrchestratorConfig,
) -> Orchestrator {
    let resolver = PermissionResolver::new(
        ChainReader::new(scenario.chain.clone(), Address::ZERO, Address::ZERO),
        scenario.content.clone(),
        scenario.deriver.clone(),
        ResolverConfig::default(),
    );
    Orchestrator::new(
        resolver,
        scenario.content.clone(),
        scenario.deriver.clone(),
        providers,
        store,
        config,
    )
}

/// Poll the store until `done` holds for the operation or `timeout` passes.
pub async fn wait_until<F>(
    orchestrator: &Orchestrator,
    id: &OperationId,
    timeout: Duration,
    done: F,
) -> Operation
where
    F: Fn(&Operation) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let op = orchestrator.get(id).await.unwrap();
        if done(&op) || tokio::time::Instant::now() >= deadline {
            return op;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
