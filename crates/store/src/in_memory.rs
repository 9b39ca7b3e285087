//! In-memory backend, useful for testing and one-shot runs.

use async_trait::async_trait;
use chrono::Utc;
use simplea2a_core::agent::{AgentDirectory, AgentProfile, ConnectionProfile, SubAgentInfo, ToolInfo};
use simplea2a_core::error::{DirectoryError, StoreError};
use simplea2a_core::task::{NewTask, StatusUpdate, StepPatch, Task, TaskStatus, TaskStep, TaskStore};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::warn;

use crate::{Capability, DirectoryAdmin};

#[derive(Default)]
struct State {
    /// Creation order
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    steps: HashMap<String, Vec<TaskStep>>,
    applications: HashMap<String, ConnectionProfile>,
    agents: BTreeMap<String, AgentProfile>,
    tools: HashMap<String, ToolInfo>,
    capabilities: HashMap<String, Vec<Capability>>,
}

impl State {
    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, StoreError> {
        let idx = *self
            .index
            .get(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        Ok(&mut self.tasks[idx])
    }

    fn task(&self, task_id: &str) -> Result<&Task, StoreError> {
        self.index
            .get(task_id)
            .map(|idx| &self.tasks[*idx])
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    fn capabilities(&self, agent_id: &str) -> Result<&[Capability], DirectoryError> {
        if !self.agents.contains_key(agent_id) {
            return Err(DirectoryError::AgentNotFound(agent_id.to_string()));
        }
        Ok(self
            .capabilities
            .get(agent_id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

/// Task store and agent directory kept in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = Task::from_new(new);
        let mut state = self.state.write().await;
        let idx = state.tasks.len();
        state.index.insert(task.id.clone(), idx);
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        update: StatusUpdate,
    ) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = state.task_mut(task_id)?;
        task.apply(update, Utc::now())?;
        Ok(task.clone())
    }

    async fn append_step(&self, step: &TaskStep) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.task(&step.task_id)?;
        let steps = state.steps.entry(step.task_id.clone()).or_default();
        if steps.iter().any(|s| s.step_id == step.step_id) {
            return Err(StoreError::Storage(format!(
                "step {} already exists in task {}",
                step.step_id, step.task_id
            )));
        }
        steps.push(step.clone());
        Ok(())
    }

    async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        patch: StepPatch,
    ) -> Result<TaskStep, StoreError> {
        let mut state = self.state.write().await;
        let step = state
            .steps
            .get_mut(task_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.step_id == step_id))
            .ok_or_else(|| StoreError::StepNotFound {
                task_id: task_id.to_string(),
                step_id: step_id.to_string(),
            })?;
        step.apply(patch, Utc::now())?;
        Ok(step.clone())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        self.state.read().await.task(task_id).cloned()
    }

    async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError> {
        let state = self.state.read().await;
        state.task(task_id)?;
        Ok(state.steps.get(task_id).cloned().unwrap_or_default())
    }

    async fn list_children(&self, task_id: &str) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        state.task(task_id)?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(task_id))
            .cloned()
            .collect())
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .rev()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = state.task_mut(task_id)?;
        task.cancel(Utc::now());
        Ok(task.clone())
    }

    async fn reject_task(&self, task_id: &str, reason: &str) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = state.task_mut(task_id)?;
        task.reject(reason, Utc::now())?;
        Ok(task.clone())
    }
}

#[async_trait]
impl AgentDirectory for InMemoryStore {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentProfile, DirectoryError> {
        self.state
            .read()
            .await
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| DirectoryError::AgentNotFound(agent_id.to_string()))
    }

    async fn get_connection(
        &self,
        application_id: &str,
    ) -> Result<ConnectionProfile, DirectoryError> {
        self.state
            .read()
            .await
            .applications
            .get(application_id)
            .cloned()
            .ok_or_else(|| DirectoryError::ApplicationNotFound {
                agent_id: String::new(),
                application_id: application_id.to_string(),
            })
    }

    async fn get_sub_agents(&self, agent_id: &str) -> Result<Vec<SubAgentInfo>, DirectoryError> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for cap in state.capabilities(agent_id)? {
            let Capability::Agent(target) = cap else {
                continue;
            };
            match state.agents.get(target) {
                Some(agent) => out.push(SubAgentInfo {
                    id: agent.id.clone(),
                    name: agent.name.clone(),
                    responsibilities: agent.responsibilities.clone(),
                }),
                None => warn!(agent_id, sub_agent = %target, "Sub-agent not in directory, skipping"),
            }
        }
        Ok(out)
    }

    async fn get_tools(&self, agent_id: &str) -> Result<Vec<ToolInfo>, DirectoryError> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for cap in state.capabilities(agent_id)? {
            let Capability::Tool(name) = cap else {
                continue;
            };
            match state.tools.get(name) {
                Some(tool) => out.push(tool.clone()),
                None => warn!(agent_id, tool = %name, "Tool not registered, skipping"),
            }
        }
        Ok(out)
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, DirectoryError> {
        Ok(self.state.read().await.agents.values().cloned().collect())
    }
}

#[async_trait]
impl DirectoryAdmin for InMemoryStore {
    async fn upsert_application(&self, profile: &ConnectionProfile) -> Result<(), DirectoryError> {
        self.state
            .write()
            .await
            .applications
            .insert(profile.application_id.clone(), profile.clone());
        Ok(())
    }

    async fn upsert_agent(&self, profile: &AgentProfile) -> Result<(), DirectoryError> {
        self.state
            .write()
            .await
            .agents
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn register_tool(&self, tool: &ToolInfo) -> Result<(), DirectoryError> {
        self.state
            .write()
            .await
            .tools
            .insert(tool.name.clone(), tool.clone());
        Ok(())
    }

    async fn grant_capability(
        &self,
        agent_id: &str,
        capability: &Capability,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.write().await;
        let caps = state.capabilities.entry(agent_id.to_string()).or_default();
        if !caps.contains(capability) {
            caps.push(capability.clone());
        }
        Ok(())
    }

    async fn clear_capabilities(&self, agent_id: &str) -> Result<(), DirectoryError> {
        self.state.write().await.capabilities.remove(agent_id);
        Ok(())
    }
}
