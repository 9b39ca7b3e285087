//! Provider trait: the abstraction over model backends.
//!
//! A Provider knows how to send one conversation history to a backend and get
//! the reply text back. Whatever the backend's wire format, the result is
//! normalized to a [`Completion`].
//!
//! Implementations: OpenAI-compatible chat completion, internal agent platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// A single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (ignored by backends that pick their own)
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Backend-side agent identifier (agent-platform calls only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_agent_id: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// The normalized reply of any backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// The reply text
    pub content: String,

    /// Which model or backend actually answered, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Total tokens consumed, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            total_tokens: None,
        }
    }
}

/// The core Provider trait.
///
/// Errors are always surfaced; a provider never swallows a failed call.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "platform").
    fn name(&self) -> &str;

    /// Send a request and get the complete reply.
    async fn complete(&self, request: ProviderRequest) -> Result<Completion, ProviderError>;
}
