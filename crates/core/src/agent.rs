//! Agent identity, connection profiles, and the AgentDirectory trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// An agent as stored in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,

    /// Responsibilities and capabilities, used to synthesize the system prompt
    #[serde(default)]
    pub responsibilities: String,

    /// The backing application (connection profile) id
    pub application_id: String,

    /// Overrides the application's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Agent identifier on the agent platform, when it differs from `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_agent_id: Option<String>,
}

/// Which call shape the backing application speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// OpenAI-compatible chat completion
    #[default]
    Chat,
    /// Internal agent platform keyed by app credentials and agent id
    Platform,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Chat => "chat",
            Environment::Platform => "platform",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Environment::Chat),
            "platform" => Ok(Environment::Platform),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// How to reach the model backend of an application.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub application_id: String,
    pub name: String,
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("application_id", &self.application_id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("app_secret", &self.app_secret.as_ref().map(|_| "***"))
            .field("environment", &self.environment)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// A delegable sub-agent as listed in a system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentInfo {
    pub id: String,
    pub name: String,
    pub responsibilities: String,
}

/// A callable tool as listed in a system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// An agent together with the connection profile of its application.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    pub identity: AgentProfile,
    pub connection: ConnectionProfile,
}

impl ResolvedAgent {
    /// Model precedence: agent override, then application default.
    pub fn model(&self) -> Option<&str> {
        self.identity
            .model
            .as_deref()
            .or(self.connection.default_model.as_deref())
    }

    /// Agent id to address on the agent platform.
    pub fn platform_agent_id(&self) -> &str {
        self.identity
            .platform_agent_id
            .as_deref()
            .unwrap_or(&self.identity.id)
    }
}

/// Read-only lookup of agents, their capabilities, and their backends.
///
/// Capabilities are resolved on every call so changes apply to the next task.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentProfile, DirectoryError>;

    async fn get_connection(&self, application_id: &str)
    -> Result<ConnectionProfile, DirectoryError>;

    /// Agents this agent may delegate to.
    async fn get_sub_agents(&self, agent_id: &str) -> Result<Vec<SubAgentInfo>, DirectoryError>;

    /// Tools this agent may call.
    async fn get_tools(&self, agent_id: &str) -> Result<Vec<ToolInfo>, DirectoryError>;

    /// Every known agent, ordered by id.
    async fn list_agents(&self) -> Result<Vec<AgentProfile>, DirectoryError>;

    async fn resolve(&self, agent_id: &str) -> Result<ResolvedAgent, DirectoryError> {
        let identity = self.get_agent(agent_id).await?;
        let connection = self
            .get_connection(&identity.application_id)
            .await
            .map_err(|e| match e {
                DirectoryError::AgentNotFound(_) | DirectoryError::ApplicationNotFound { .. } => {
                    DirectoryError::ApplicationNotFound {
                        agent_id: identity.id.clone(),
                        application_id: identity.application_id.clone(),
                    }
                }
                other => other,
            })?;
        Ok(ResolvedAgent {
            identity,
            connection,
        })
    }
}
