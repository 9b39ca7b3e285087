//! Tasks, task steps, and the TaskStore trait.
//!
//! The store is the single source of truth for task state. The orchestrator
//! is the only writer of status transitions apart from an external cancel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::action::Action;
use crate::error::StoreError;

/// Arbitrary key/value context carried with an instruction.
pub type Context = Map<String, Value>;

/// Error text recorded on a task that was cancelled externally.
pub const CANCELLED_ERROR: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Delegated,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Delegated => "delegated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Delegated
        )
    }

    /// Transitions allowed outside of a forced cancel or reject.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => next == TaskStatus::Running,
            TaskStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "delegated" => Ok(TaskStatus::Delegated),
            other => Err(StoreError::Serialization(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// The input payload of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    pub instruction: String,
    #[serde(default)]
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub agent_id: String,

    /// Originating input source (trigger), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Parent task for delegated work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    pub status: TaskStatus,
    pub input: TaskInput,

    /// Present for `completed` and as the hand-off summary for `delegated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Present only when `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Materialize a new pending task with a fresh id.
    pub fn from_new(new: NewTask) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: new.agent_id,
            source_id: new.source_id,
            parent_id: new.parent_id,
            status: TaskStatus::Pending,
            input: TaskInput {
                instruction: new.instruction,
                context: new.context,
            },
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a status update, enforcing the monotonic status order.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<(), StoreError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        match update {
            StatusUpdate::Running => self.started_at = Some(now),
            StatusUpdate::Completed(result) | StatusUpdate::Delegated(result) => {
                self.result = Some(result);
                self.error = None;
                self.finished_at = Some(now);
            }
            StatusUpdate::Failed(error) => {
                self.result = None;
                self.error = Some(error);
                self.finished_at = Some(now);
            }
        }
        Ok(())
    }

    /// Forced transition to `failed`, allowed from any status.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.result = None;
        self.error = Some(CANCELLED_ERROR.to_string());
        self.finished_at = Some(now);
    }

    /// Forced transition to `failed` for a task that could never be started.
    /// Only a pending task can be rejected.
    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.status != TaskStatus::Pending {
            return Err(StoreError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status.to_string(),
                to: TaskStatus::Failed.to_string(),
            });
        }
        self.status = TaskStatus::Failed;
        self.error = Some(reason.into());
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TaskStatus::Failed && self.error.as_deref() == Some(CANCELLED_ERROR)
    }
}

/// Parameters for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub agent_id: String,
    pub instruction: String,
    pub context: Context,
    pub parent_id: Option<String>,
    pub source_id: Option<String>,
}

impl NewTask {
    pub fn new(agent_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// A requested status change together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Running,
    Completed(Value),
    Failed(String),
    Delegated(Value),
}

impl StatusUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            StatusUpdate::Running => TaskStatus::Running,
            StatusUpdate::Completed(_) => TaskStatus::Completed,
            StatusUpdate::Failed(_) => TaskStatus::Failed,
            StatusUpdate::Delegated(_) => TaskStatus::Delegated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            other => Err(StoreError::Serialization(format!(
                "unknown step status '{other}'"
            ))),
        }
    }
}

/// One reasoning iteration of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub task_id: String,
    /// `step_1`, `step_2`, ...
    pub step_id: String,
    pub agent_id: String,
    pub instruction: String,
    #[serde(default)]
    pub context: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<Value>,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    pub fn step_id_for(index: usize) -> String {
        format!("step_{index}")
    }

    /// A step in `running` state, written before the model is called.
    pub fn begin(
        task: &Task,
        index: usize,
        instruction: impl Into<String>,
        context: Context,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            step_id: Self::step_id_for(index),
            agent_id: task.agent_id.clone(),
            instruction: instruction.into(),
            context,
            raw_reply: None,
            action: None,
            action_result: None,
            status: StepStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Merge a patch. A step that already reached a final status is not revisited.
    pub fn apply(&mut self, patch: StepPatch, now: DateTime<Utc>) -> Result<(), StoreError> {
        if self.status != StepStatus::Running {
            return Err(StoreError::InvalidTransition {
                task_id: self.task_id.clone(),
                from: format!("{} {}", self.step_id, self.status.as_str()),
                to: patch
                    .status
                    .map(|s| s.as_str())
                    .unwrap_or("patched")
                    .to_string(),
            });
        }
        if let Some(raw) = patch.raw_reply {
            self.raw_reply = Some(raw);
        }
        if let Some(action) = patch.action {
            self.action = Some(action);
        }
        if let Some(result) = patch.action_result {
            self.action_result = Some(result);
        }
        if let Some(status) = patch.status {
            self.status = status;
            if status != StepStatus::Running {
                self.finished_at = Some(now);
            }
        }
        Ok(())
    }
}

/// Partial update of a running step. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPatch {
    pub raw_reply: Option<String>,
    pub action: Option<Action>,
    pub action_result: Option<Value>,
    pub status: Option<StepStatus>,
}

impl StepPatch {
    pub fn reply(raw: impl Into<String>, action: Option<Action>) -> Self {
        Self {
            raw_reply: Some(raw.into()),
            action,
            ..Default::default()
        }
    }

    pub fn finish(status: StepStatus, result: Value) -> Self {
        Self {
            action_result: Some(result),
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Durable record of tasks and their steps.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError>;

    /// Transition a task, enforcing the monotonic status order.
    async fn update_task_status(
        &self,
        task_id: &str,
        update: StatusUpdate,
    ) -> Result<Task, StoreError>;

    async fn append_step(&self, step: &TaskStep) -> Result<(), StoreError>;

    async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        patch: StepPatch,
    ) -> Result<TaskStep, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError>;

    /// Steps of a task in execution order.
    async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError>;

    /// Tasks whose parent is `task_id`, oldest first.
    async fn list_children(&self, task_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Most recent tasks first, optionally filtered by status.
    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    /// Forced transition to `failed` with error "cancelled".
    async fn cancel_task(&self, task_id: &str) -> Result<Task, StoreError>;

    /// Fail a task that was never started, e.g. because it could not be
    /// queued. Errors with `InvalidTransition` unless the task is pending.
    async fn reject_task(&self, task_id: &str, reason: &str) -> Result<Task, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> Task {
        Task::from_new(NewTask::new("planner", "plan a trip"))
    }

    #[test]
    fn new_task_starts_pending() {
        let task = pending();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());
        assert!(task.started_at.is_none());
        assert_eq!(task.input.instruction, "plan a trip");
    }

    #[test]
    fn status_moves_forward_only() {
        let mut task = pending();
        let now = Utc::now();
        task.apply(StatusUpdate::Running, now).unwrap();
        assert_eq!(task.started_at, Some(now));

        task.apply(StatusUpdate::Completed(json!("done")), now).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(json!("done")));
        assert!(task.finished_at.is_some());

        let err = task.apply(StatusUpdate::Running, now).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        let err = task
            .apply(StatusUpdate::Failed("late".into()), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn pending_must_start_before_finishing() {
        let mut task = pending();
        assert!(task.apply(StatusUpdate::Completed(json!(1)), Utc::now()).is_err());
        assert!(task.apply(StatusUpdate::Failed("no agent".into()), Utc::now()).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn reject_only_applies_to_pending() {
        let mut task = pending();
        let now = Utc::now();
        task.reject("queue closed", now).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("queue closed"));
        assert_eq!(task.finished_at, Some(now));
        assert!(!task.is_cancelled());

        let mut running = pending();
        running.apply(StatusUpdate::Running, now).unwrap();
        let err = running.reject("too late", now).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(running.status, TaskStatus::Running);
    }

    #[test]
    fn cancel_forces_failed_from_terminal() {
        let mut task = pending();
        let now = Utc::now();
        task.apply(StatusUpdate::Running, now).unwrap();
        task.apply(StatusUpdate::Completed(json!("x")), now).unwrap();
        task.cancel(now);
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result.is_none());
        assert!(task.is_cancelled());
    }

    #[test]
    fn step_ids_are_sequential() {
        let task = pending();
        let step = TaskStep::begin(&task, 3, "go", Context::new());
        assert_eq!(step.step_id, "step_3");
        assert_eq!(step.status, StepStatus::Running);
        assert_eq!(step.agent_id, "planner");
    }

    #[test]
    fn finished_step_is_not_revisited() {
        let task = pending();
        let mut step = TaskStep::begin(&task, 1, "go", Context::new());
        let now = Utc::now();
        step.apply(StepPatch::reply("Final Answer: ok", None), now)
            .unwrap();
        step.apply(StepPatch::finish(StepStatus::Completed, json!("ok")), now)
            .unwrap();
        assert_eq!(step.finished_at, Some(now));
        assert!(step
            .apply(StepPatch::finish(StepStatus::Failed, json!("again")), now)
            .is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Delegated,
        ] {
            assert_eq!(s.as_str().parse::<TaskStatus>().unwrap(), s);
        }
        assert!("paused".parse::<TaskStatus>().is_err());
    }
}
