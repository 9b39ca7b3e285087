//! Conversation history entries.
//!
//! The orchestrator seeds a history with the synthesized system prompt and the
//! task instruction, then appends every model reply and every observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every observation fed back to the model.
pub const OBSERVATION_PREFIX: &str = "Observation: ";

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The task instruction and observations
    User,
    /// The model's replies
    Assistant,
    /// The synthesized agent prompt
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create an observation: a user-role message carrying the outcome of the
    /// previous step's action.
    pub fn observation(content: impl AsRef<str>) -> Self {
        Self::new(
            Role::User,
            format!("{OBSERVATION_PREFIX}{}", content.as_ref()),
        )
    }

    /// Whether this message is an observation.
    pub fn is_observation(&self) -> bool {
        self.role == Role::User && self.content.starts_with(OBSERVATION_PREFIX)
    }
}
