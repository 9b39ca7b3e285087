//! The orchestrator: runs one task's reasoning loop to a terminal status.
//!
//! Each iteration writes a `running` step, calls the model through the shared
//! rate-limited invoker, parses the reply and dispatches the directive:
//!
//! | directive | effect |
//! |---|---|
//! | none / `result` | final answer, or async hand-off if it embeds an `a2a-task` |
//! | `skill-call` to `agent:<id>` | child task run inline, its answer is the observation |
//! | other `skill-call` | tool call, its output (or error) is the observation |
//! | `a2a-task` | async hand-off: child queued, this task ends `delegated` |
//!
//! Model failures fail the task. Tool and synchronous delegation failures only
//! become observations. Running out of steps completes the task with a
//! `max_steps_reached` marker.

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use simplea2a_core::action::{Action, SkillCall, TaskTransfer};
use simplea2a_core::agent::AgentDirectory;
use simplea2a_core::error::{DelegationError, Result, StoreError};
use simplea2a_core::event::{DomainEvent, EventBus};
use simplea2a_core::message::Message;
use simplea2a_core::task::{
    NewTask, StatusUpdate, StepPatch, StepStatus, Task, TaskInput, TaskStatus, TaskStep,
    TaskStore,
};
use simplea2a_core::tool::ToolRegistry;
use simplea2a_providers::RateLimitedInvoker;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::parser::{ParseMode, find_task_transfer, parse};
use crate::prompt::build_system_prompt;
use crate::scheduler::TaskSubmitter;

/// How a task's loop ended.
enum Outcome {
    Completed(Value),
    Delegated { summary: Value, child_id: String },
    Failed(String),
    /// Cancelled from outside; the stored status already says so.
    Cancelled,
}

/// What a dispatched skill call feeds back to the model.
struct Observation {
    text: String,
    result: Value,
    success: bool,
}

impl Observation {
    fn failed(message: String) -> Self {
        Self {
            text: format!("Error: {message}"),
            result: json!({ "error": message }),
            success: false,
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    directory: Arc<dyn AgentDirectory>,
    invoker: Arc<RateLimitedInvoker>,
    tools: ToolRegistry,
    event_bus: Arc<EventBus>,
    submitter: Option<TaskSubmitter>,
    max_steps: usize,
    max_delegation_depth: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        directory: Arc<dyn AgentDirectory>,
        invoker: Arc<RateLimitedInvoker>,
        tools: ToolRegistry,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            directory,
            invoker,
            tools,
            event_bus,
            submitter: None,
            max_steps: 10,
            max_delegation_depth: 3,
        }
    }

    /// Maximum reasoning iterations per task.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Maximum nesting of synchronous `agent:<id>` delegation.
    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    /// Where asynchronously delegated child tasks are queued. Without one,
    /// children are created and left `pending`.
    pub fn with_submitter(mut self, submitter: TaskSubmitter) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn AgentDirectory> {
        &self.directory
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn submitter(&self) -> Option<&TaskSubmitter> {
        self.submitter.as_ref()
    }

    /// Create a pending task for a known agent.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        self.directory.get_agent(&new.agent_id).await?;
        let task = self.store.create_task(new).await?;
        info!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
        Ok(task)
    }

    /// Create a task and queue it for execution.
    ///
    /// Nothing is written when the queue is already closed. A task whose
    /// queueing fails after creation is rejected so it is never picked up.
    pub async fn submit(&self, new: NewTask) -> Result<Task> {
        let Some(submitter) = &self.submitter else {
            let task = self.create_task(new).await?;
            warn!(task_id = %task.id, "No scheduler attached, task stays pending");
            return Ok(task);
        };
        if submitter.is_closed() {
            return Err(DelegationError::QueueClosed.into());
        }

        let task = self.create_task(new).await?;
        if let Err(e) = submitter.submit(task.id.clone()) {
            error!(task_id = %task.id, error = %e, "Could not queue task");
            self.store.reject_task(&task.id, &e.to_string()).await?;
            return Err(DelegationError::QueueClosed.into());
        }
        Ok(task)
    }

    /// Run a pending task to a terminal status and return its final record.
    ///
    /// Tasks that are no longer pending are returned untouched.
    pub async fn execute_task(&self, task_id: &str) -> Result<Task> {
        let task = self.store.get_task(task_id).await?;
        if task.status != TaskStatus::Pending {
            debug!(task_id, status = %task.status, "Task is not pending, skipping");
            return Ok(task);
        }
        self.run(task, 0).await
    }

    fn run(&self, task: Task, depth: usize) -> BoxFuture<'_, Result<Task>> {
        Box::pin(async move {
            let task = match self
                .store
                .update_task_status(&task.id, StatusUpdate::Running)
                .await
            {
                Ok(task) => task,
                Err(StoreError::InvalidTransition { .. }) => {
                    debug!(task_id = %task.id, "Task left pending before it started");
                    return Ok(self.store.get_task(&task.id).await?);
                }
                Err(e) => return Err(e.into()),
            };

            info!(task_id = %task.id, agent_id = %task.agent_id, depth, "Task started");
            self.event_bus.publish(DomainEvent::TaskStarted {
                task_id: task.id.clone(),
                agent_id: task.agent_id.clone(),
                depth,
                timestamp: Utc::now(),
            });

            let outcome = match self.drive(&task, depth).await {
                Ok(outcome) => outcome,
                Err(e) => Outcome::Failed(e.to_string()),
            };
            self.finish(&task, outcome).await
        })
    }

    async fn drive(&self, task: &Task, depth: usize) -> Result<Outcome> {
        let agent = self.directory.resolve(&task.agent_id).await?;
        let sub_agents = self.directory.get_sub_agents(&agent.identity.id).await?;
        let tools = self.directory.get_tools(&agent.identity.id).await?;
        let system_prompt = build_system_prompt(&agent.identity, &sub_agents, &tools);

        let mut history = vec![
            Message::system(system_prompt),
            Message::user(opening_message(&task.input)),
        ];
        let mut last_reply: Option<String> = None;

        for index in 1..=self.max_steps {
            if self.store.get_task(&task.id).await?.is_cancelled() {
                info!(task_id = %task.id, "Task cancelled, stopping");
                return Ok(Outcome::Cancelled);
            }

            let instruction = history
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let step = TaskStep::begin(task, index, instruction, task.input.context.clone());
            self.store.append_step(&step).await?;
            debug!(task_id = %task.id, step_id = %step.step_id, depth, "Step started");

            let reply = match self.invoker.invoke(&history, &agent).await {
                Ok(completion) => completion.content,
                Err(e) => {
                    let message = e.to_string();
                    self.finish_step(&step, None, StepStatus::Failed, json!({ "error": message }))
                        .await?;
                    return Ok(Outcome::Failed(message));
                }
            };
            history.push(Message::assistant(reply.clone()));
            last_reply = Some(reply.clone());

            let parsed = parse(&reply, ParseMode::ReAct);
            let action = parsed.action().cloned();
            let tag = action.as_ref().map(Action::type_tag);
            self.store
                .update_step(
                    &task.id,
                    &step.step_id,
                    StepPatch::reply(reply.clone(), action.clone()),
                )
                .await?;

            match action {
                None | Some(Action::Result(_)) => {
                    let (answer, result) = match action {
                        Some(Action::Result(r)) => (r.text(), r.data),
                        _ => {
                            let text = reply.trim().to_string();
                            (text.clone(), Value::String(text))
                        }
                    };
                    if let Some(transfer) = find_task_transfer(&answer) {
                        return self.hand_off(task, &step, transfer).await;
                    }
                    self.finish_step(&step, tag, StepStatus::Completed, result.clone())
                        .await?;
                    return Ok(Outcome::Completed(result));
                }
                Some(Action::SkillCall(call)) => {
                    let observation = match call.delegate_target() {
                        Some(target) => self.delegate_sync(task, target, &call, depth).await,
                        None => self.call_tool(task, &call).await,
                    };
                    let status = if observation.success {
                        StepStatus::Completed
                    } else {
                        StepStatus::Failed
                    };
                    self.finish_step(&step, tag, status, observation.result)
                        .await?;
                    history.push(Message::observation(&observation.text));
                }
                Some(Action::TaskTransfer(transfer)) => {
                    return self.hand_off(task, &step, transfer).await;
                }
            }
        }

        warn!(task_id = %task.id, max_steps = self.max_steps, "Step budget exhausted");
        Ok(Outcome::Completed(json!({
            "max_steps_reached": true,
            "steps": self.max_steps,
            "last_reply": last_reply,
        })))
    }

    async fn finish_step(
        &self,
        step: &TaskStep,
        action: Option<&'static str>,
        status: StepStatus,
        result: Value,
    ) -> Result<()> {
        self.store
            .update_step(&step.task_id, &step.step_id, StepPatch::finish(status, result))
            .await?;
        self.event_bus.publish(DomainEvent::StepCompleted {
            task_id: step.task_id.clone(),
            step_id: step.step_id.clone(),
            action: action.map(str::to_string),
            success: status == StepStatus::Completed,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn call_tool(&self, task: &Task, call: &SkillCall) -> Observation {
        let started = Instant::now();
        let outcome = self.tools.call(&call.skill, call.parameters.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            task_id: task.id.clone(),
            tool_name: call.skill.clone(),
            success: outcome.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match outcome {
            Ok(result) => {
                debug!(task_id = %task.id, tool = %call.skill, duration_ms, "Tool call succeeded");
                Observation {
                    text: result.output.clone(),
                    result: result.to_value(),
                    success: true,
                }
            }
            Err(e) => {
                warn!(task_id = %task.id, tool = %call.skill, error = %e, "Tool call failed");
                Observation::failed(e.to_string())
            }
        }
    }

    /// Run a child task for `target` inline and turn its outcome into an
    /// observation. Never fails the calling task.
    async fn delegate_sync(
        &self,
        task: &Task,
        target: &str,
        call: &SkillCall,
        depth: usize,
    ) -> Observation {
        let child_depth = depth + 1;
        if child_depth > self.max_delegation_depth {
            let err = DelegationError::DepthExceeded {
                target: target.to_string(),
                max_depth: self.max_delegation_depth,
            };
            warn!(task_id = %task.id, depth, error = %err, "Synchronous delegation refused");
            return Observation::failed(err.to_string());
        }

        if let Err(e) = self.directory.get_agent(target).await {
            let err = DelegationError::ChildCreation {
                target: target.to_string(),
                reason: e.to_string(),
            };
            warn!(task_id = %task.id, error = %err, "Synchronous delegation refused");
            return Observation::failed(err.to_string());
        }

        let new = NewTask::new(target, call.delegated_instruction())
            .with_parent(task.id.clone())
            .with_context(call.delegated_context());
        let child = match self.store.create_task(new).await {
            Ok(child) => child,
            Err(e) => {
                let err = DelegationError::ChildCreation {
                    target: target.to_string(),
                    reason: e.to_string(),
                };
                warn!(task_id = %task.id, error = %err, "Synchronous delegation failed");
                return Observation::failed(err.to_string());
            }
        };

        info!(
            task_id = %task.id,
            child_task_id = %child.id,
            target_agent = target,
            depth = child_depth,
            "Delegating synchronously"
        );
        self.event_bus.publish(DomainEvent::TaskDelegated {
            task_id: task.id.clone(),
            child_task_id: child.id.clone(),
            target_agent: target.to_string(),
            synchronous: true,
            timestamp: Utc::now(),
        });

        let child = match self.run(child, child_depth).await {
            Ok(child) => child,
            Err(e) => {
                warn!(task_id = %task.id, target_agent = target, error = %e, "Child task aborted");
                return Observation::failed(format!("agent '{target}' could not run: {e}"));
            }
        };

        match child.status {
            TaskStatus::Completed => Observation {
                text: value_text(child.result.as_ref()),
                result: json!({
                    "child_task_id": child.id,
                    "status": child.status,
                    "answer": child.result,
                }),
                success: true,
            },
            TaskStatus::Delegated => Observation {
                text: format!(
                    "agent '{target}' handed the task off: {}",
                    value_text(child.result.as_ref())
                ),
                result: json!({
                    "child_task_id": child.id,
                    "status": child.status,
                    "handoff": child.result,
                }),
                success: true,
            },
            _ => {
                let reason = child.error.unwrap_or_else(|| child.status.to_string());
                warn!(task_id = %task.id, target_agent = target, reason = %reason, "Child task failed");
                Observation::failed(format!("agent '{target}' failed: {reason}"))
            }
        }
    }

    /// Asynchronous hand-off. The child is only created here; it is queued
    /// after this task's `delegated` status has been written.
    async fn hand_off(
        &self,
        task: &Task,
        step: &TaskStep,
        transfer: TaskTransfer,
    ) -> Result<Outcome> {
        let child = match self.create_child(task, &transfer).await {
            Ok(child) => child,
            Err(e) => {
                self.finish_step(
                    step,
                    Some("a2a-task"),
                    StepStatus::Failed,
                    json!({ "error": e.to_string() }),
                )
                .await?;
                return Err(e.into());
            }
        };

        let summary = json!({
            "delegated_to": transfer.target_agent,
            "child_task_id": child.id,
            "task": transfer.task,
            "priority": transfer.priority,
            "timeout": transfer.timeout,
        });
        self.finish_step(step, Some("a2a-task"), StepStatus::Completed, summary.clone())
            .await?;

        info!(
            task_id = %task.id,
            child_task_id = %child.id,
            target_agent = %transfer.target_agent,
            "Task handed off"
        );
        self.event_bus.publish(DomainEvent::TaskDelegated {
            task_id: task.id.clone(),
            child_task_id: child.id.clone(),
            target_agent: transfer.target_agent,
            synchronous: false,
            timestamp: Utc::now(),
        });

        Ok(Outcome::Delegated {
            summary,
            child_id: child.id,
        })
    }

    async fn create_child(
        &self,
        task: &Task,
        transfer: &TaskTransfer,
    ) -> std::result::Result<Task, DelegationError> {
        let creation_failed = |reason: String| DelegationError::ChildCreation {
            target: transfer.target_agent.clone(),
            reason,
        };

        if self.submitter.as_ref().is_some_and(TaskSubmitter::is_closed) {
            return Err(creation_failed("scheduler is not running".into()));
        }
        self.directory
            .get_agent(&transfer.target_agent)
            .await
            .map_err(|e| creation_failed(e.to_string()))?;

        let new = NewTask::new(transfer.target_agent.clone(), transfer.task.clone())
            .with_parent(task.id.clone())
            .with_context(transfer.context.clone());
        self.store
            .create_task(new)
            .await
            .map_err(|e| creation_failed(e.to_string()))
    }

    async fn finish(&self, task: &Task, outcome: Outcome) -> Result<Task> {
        let (update, child_id) = match outcome {
            Outcome::Cancelled => return Ok(self.store.get_task(&task.id).await?),
            Outcome::Completed(result) => (StatusUpdate::Completed(result), None),
            Outcome::Delegated { summary, child_id } => {
                (StatusUpdate::Delegated(summary), Some(child_id))
            }
            Outcome::Failed(message) => {
                error!(task_id = %task.id, error = %message, "Task failed");
                (StatusUpdate::Failed(message), None)
            }
        };

        let finished = match self.store.update_task_status(&task.id, update).await {
            Ok(finished) => finished,
            Err(StoreError::InvalidTransition { from, .. }) => {
                warn!(task_id = %task.id, current = %from, "Task changed while running, keeping stored status");
                if let Some(child_id) = child_id {
                    self.store.cancel_task(&child_id).await?;
                }
                return Ok(self.store.get_task(&task.id).await?);
            }
            Err(e) => return Err(e.into()),
        };

        info!(task_id = %task.id, status = %finished.status, "Task finished");
        self.event_bus.publish(DomainEvent::TaskFinished {
            task_id: finished.id.clone(),
            status: finished.status,
            timestamp: Utc::now(),
        });

        if let Some(child_id) = child_id {
            self.schedule_child(&child_id).await?;
        }
        Ok(finished)
    }

    async fn schedule_child(&self, child_id: &str) -> Result<()> {
        let Some(submitter) = &self.submitter else {
            info!(child_task_id = child_id, "No scheduler attached, delegated task stays pending");
            return Ok(());
        };
        if let Err(e) = submitter.submit(child_id) {
            error!(child_task_id = child_id, error = %e, "Could not queue delegated task");
            self.store.reject_task(child_id, &e.to_string()).await?;
        }
        Ok(())
    }
}

/// The first user message: the instruction plus any context.
fn opening_message(input: &TaskInput) -> String {
    if input.context.is_empty() {
        return input.instruction.clone();
    }
    let context = serde_json::to_string_pretty(&input.context).unwrap_or_default();
    format!("{}\n\nContext:\n{context}", input.instruction)
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
