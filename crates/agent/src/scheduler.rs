//! Task scheduler: runs submitted tasks as independent Tokio tasks.
//!
//! Triggers and async delegation only *submit* a task id and return at once.
//! The scheduler picks ids up in submission order and spawns one execution per
//! id, with at most `max_concurrent` running at a time.

use simplea2a_core::error::DelegationError;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info};

use crate::orchestrator::Orchestrator;

/// Cloneable handle for queueing task ids.
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    tx: mpsc::UnboundedSender<String>,
}

impl TaskSubmitter {
    /// Queue a task for execution. Never waits.
    pub fn submit(&self, task_id: impl Into<String>) -> Result<(), DelegationError> {
        let task_id = task_id.into();
        self.tx
            .send(task_id)
            .map_err(|e| DelegationError::ChildCreation {
                target: e.0,
                reason: "scheduler is not running".into(),
            })
    }

    /// Whether the scheduler has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Scheduler {
    rx: mpsc::UnboundedReceiver<String>,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn channel(max_concurrent: usize) -> (TaskSubmitter, Scheduler) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TaskSubmitter { tx },
            Scheduler {
                rx,
                max_concurrent: max_concurrent.max(1),
            },
        )
    }

    /// Execute submitted tasks until the queue closes.
    ///
    /// The queue only closes once every [`TaskSubmitter`] is dropped. An
    /// orchestrator built with `with_submitter` holds one itself, so in that
    /// setup the loop runs until its Tokio task is aborted or the runtime
    /// shuts down.
    pub async fn run(mut self, orchestrator: Arc<Orchestrator>) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        info!(max_concurrent = self.max_concurrent, "Scheduler started");

        while let Some(task_id) = self.rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            debug!(task_id = %task_id, "Dispatching task");
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = orchestrator.execute_task(&task_id).await {
                    error!(task_id = %task_id, error = %e, "Task execution aborted");
                }
            });
        }

        info!("Scheduler stopped");
    }
}
