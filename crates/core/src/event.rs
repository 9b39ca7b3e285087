//! Domain event system. Lets triggers observe task progress without polling.
//!
//! The orchestrator publishes an event for each lifecycle transition. The
//! store stays the source of truth; events are best-effort notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::task::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A task moved to `running`
    TaskStarted {
        task_id: String,
        agent_id: String,
        depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// A reasoning step reached a final status
    StepCompleted {
        task_id: String,
        step_id: String,
        /// Wire tag of the parsed action, if any
        action: Option<String>,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was dispatched
    ToolExecuted {
        task_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A child task was created for another agent
    TaskDelegated {
        task_id: String,
        child_task_id: String,
        target_agent: String,
        synchronous: bool,
        timestamp: DateTime<Utc>,
    },

    /// A task reached a terminal status
    TaskFinished {
        task_id: String,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn task_id(&self) -> &str {
        match self {
            DomainEvent::TaskStarted { task_id, .. }
            | DomainEvent::StepCompleted { task_id, .. }
            | DomainEvent::ToolExecuted { task_id, .. }
            | DomainEvent::TaskDelegated { task_id, .. }
            | DomainEvent::TaskFinished { task_id, .. } => task_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Slow subscribers lag and lose the oldest events; publishers never block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            task_id: "t1".into(),
            tool_name: "http_request".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id(), "t1");
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "http_request");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::TaskFinished {
            task_id: "t1".into(),
            status: TaskStatus::Completed,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = DomainEvent::TaskFinished {
            task_id: "t1".into(),
            status: TaskStatus::Delegated,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task_finished");
        assert_eq!(json["status"], "delegated");
    }
}
