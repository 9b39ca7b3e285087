//! The rate-limited invoker: the single entry point for model calls.
//!
//! Every call, whichever task and backend it belongs to, passes through one
//! shared [`RateGate`]. Failures are returned as-is; retrying is left to the
//! caller.

use simplea2a_core::agent::{Environment, ResolvedAgent};
use simplea2a_core::error::ProviderError;
use simplea2a_core::message::Message;
use simplea2a_core::provider::{Completion, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::rate_limit::RateGate;
use crate::router::ProviderResolver;

pub struct RateLimitedInvoker {
    gate: Arc<RateGate>,
    resolver: Arc<dyn ProviderResolver>,
    default_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl RateLimitedInvoker {
    pub fn new(gate: Arc<RateGate>, resolver: Arc<dyn ProviderResolver>) -> Self {
        Self {
            gate,
            resolver,
            default_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Send the full history to the agent's backend and return the reply.
    pub async fn invoke(
        &self,
        history: &[Message],
        agent: &ResolvedAgent,
    ) -> Result<Completion, ProviderError> {
        let provider = self.resolver.resolve(&agent.connection)?;

        let platform_agent_id = match agent.connection.environment {
            Environment::Platform => Some(agent.platform_agent_id().to_string()),
            Environment::Chat => None,
        };
        let request = ProviderRequest {
            model: agent.model().unwrap_or(&self.default_model).to_string(),
            messages: history.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            platform_agent_id,
        };

        self.gate.acquire().await;
        debug!(
            agent_id = %agent.identity.id,
            provider = provider.name(),
            model = %request.model,
            "Invoking model"
        );

        match provider.complete(request).await {
            Ok(completion) => Ok(completion),
            Err(e) => {
                warn!(agent_id = %agent.identity.id, error = %e, "Model invocation failed");
                Err(e)
            }
        }
    }
}
