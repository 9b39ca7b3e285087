//! Shared fixtures for orchestrator and scheduler tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use simplea2a_core::agent::{AgentProfile, ConnectionProfile, Environment, ToolInfo};
use simplea2a_core::error::{ProviderError, ToolError};
use simplea2a_core::event::EventBus;
use simplea2a_core::provider::{Completion, Provider, ProviderRequest};
use simplea2a_core::task::{Task, TaskStatus, TaskStore};
use simplea2a_core::tool::{Tool, ToolRegistry, ToolResult};
use simplea2a_providers::{RateGate, RateLimitedInvoker, SingleProvider};
use simplea2a_store::{Capability, DirectoryAdmin, InMemoryStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::orchestrator::Orchestrator;

/// A provider that replays a script of replies in order.
///
/// Once the script runs out it answers with the fallback, or fails.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<(Instant, ProviderRequest)>>,
}

impl ScriptedProvider {
    pub fn new<S: AsRef<str>>(replies: Vec<S>) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.as_ref().to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same reply.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::with_results(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<Completion, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request));
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply.map(Completion::text),
            (None, Some(fallback)) => Ok(Completion::text(fallback.clone())),
            (None, None) => Err(ProviderError::InvalidResponse("script exhausted".into())),
        }
    }
}

/// A tool that records its arguments and always returns the same text.
pub struct RecordingTool {
    name: String,
    output: String,
    calls: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its arguments"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(params);
        Ok(ToolResult::text(self.output.clone()))
    }
}

/// A tool that cancels every running task, standing in for an external cancel.
pub struct CancelRunningTool {
    store: Arc<InMemoryStore>,
}

impl CancelRunningTool {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CancelRunningTool {
    fn name(&self) -> &str {
        "cancel_running"
    }

    fn description(&self) -> &str {
        "Cancels running tasks"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, _params: Value) -> Result<ToolResult, ToolError> {
        let running = self
            .store
            .list_tasks(Some(TaskStatus::Running), 100)
            .await
            .unwrap();
        for task in running {
            self.store.cancel_task(&task.id).await.unwrap();
        }
        Ok(ToolResult::text("cancelled"))
    }
}

/// An in-memory directory with two agents, `lead` and `helper`, that may
/// delegate to each other, backed by one scripted provider.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub tools: ToolRegistry,
    pub event_bus: Arc<EventBus>,
    pub gate: Arc<RateGate>,
}

impl Harness {
    pub async fn new(provider: ScriptedProvider) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_application(&ConnectionProfile {
                application_id: "test".into(),
                name: "Test".into(),
                base_url: "http://localhost:9".into(),
                api_key: None,
                app_secret: None,
                environment: Environment::Chat,
                default_model: Some("test-model".into()),
            })
            .await
            .unwrap();
        for (id, name, peer) in [("lead", "Lead", "helper"), ("helper", "Helper", "lead")] {
            store
                .upsert_agent(&AgentProfile {
                    id: id.into(),
                    name: name.into(),
                    responsibilities: format!("{name} things."),
                    application_id: "test".into(),
                    model: None,
                    platform_agent_id: None,
                })
                .await
                .unwrap();
            store
                .grant_capability(id, &Capability::Agent(peer.into()))
                .await
                .unwrap();
        }
        store
            .register_tool(&ToolInfo {
                name: "web_search".into(),
                description: "Search the web".into(),
            })
            .await
            .unwrap();
        store
            .grant_capability("lead", &Capability::Tool("web_search".into()))
            .await
            .unwrap();

        Self {
            store,
            provider: Arc::new(provider),
            tools: ToolRegistry::new(),
            event_bus: Arc::new(EventBus::default()),
            gate: Arc::new(RateGate::per_second(1_000)),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let invoker = RateLimitedInvoker::new(
            self.gate.clone(),
            Arc::new(SingleProvider(self.provider.clone())),
        );
        Orchestrator::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(invoker),
            self.tools.clone(),
            self.event_bus.clone(),
        )
    }

    pub async fn wait_for_terminal(&self, task_id: &str, timeout: Duration) -> Task {
        let deadline = Instant::now() + timeout;
        loop {
            let task = self.store.get_task(task_id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            assert!(Instant::now() < deadline, "task {task_id} still {}", task.status);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
