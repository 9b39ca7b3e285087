//! Task store and agent directory backends for simplea2a.
//!
//! Two backends implement `TaskStore`, `AgentDirectory` and [`DirectoryAdmin`]:
//! - [`InMemoryStore`]: ephemeral, for tests and one-shot runs
//! - [`SqliteStore`]: durable, via `sqlx`
//!
//! The directory is seeded from configuration at start-up with
//! [`seed_from_config`].

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use simplea2a_config::{AppConfig, StoreBackend, StoreConfig};
use simplea2a_core::agent::{AgentDirectory, AgentProfile, ConnectionProfile, ToolInfo};
use simplea2a_core::error::{DirectoryError, StoreError};
use simplea2a_core::task::TaskStore;
use std::sync::Arc;
use tracing::info;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// One row of the capability table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// May delegate to this agent id
    Agent(String),
    /// May call this tool name
    Tool(String),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Agent(_) => "agent",
            Capability::Tool(_) => "tool",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Capability::Agent(t) | Capability::Tool(t) => t,
        }
    }
}

/// Write side of the agent directory.
#[async_trait]
pub trait DirectoryAdmin: Send + Sync {
    async fn upsert_application(&self, profile: &ConnectionProfile) -> Result<(), DirectoryError>;

    async fn upsert_agent(&self, profile: &AgentProfile) -> Result<(), DirectoryError>;

    async fn register_tool(&self, tool: &ToolInfo) -> Result<(), DirectoryError>;

    async fn grant_capability(
        &self,
        agent_id: &str,
        capability: &Capability,
    ) -> Result<(), DirectoryError>;

    /// Drop every capability of an agent.
    async fn clear_capabilities(&self, agent_id: &str) -> Result<(), DirectoryError>;
}

/// Shared handles onto one backend.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub directory: Arc<dyn AgentDirectory>,
    pub admin: Arc<dyn DirectoryAdmin>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            tasks: store.clone(),
            directory: store.clone(),
            admin: store,
        }
    }
}

/// Open the backend selected in configuration.
pub async fn open(config: &StoreConfig) -> Result<Stores, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory task store");
            Ok(Stores::in_memory())
        }
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let url = format!("sqlite://{}", config.path.display());
            let store = Arc::new(SqliteStore::new(&url).await?);
            Ok(Stores {
                tasks: store.clone(),
                directory: store.clone(),
                admin: store,
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(StoreError::Storage(
            "built without the sqlite feature".into(),
        )),
    }
}

/// Load applications, tools, agents and their capabilities into the directory.
///
/// Each configured agent's capabilities are replaced, so removing a sub-agent
/// or tool from the configuration revokes it on the next start.
pub async fn seed_from_config(
    admin: &dyn DirectoryAdmin,
    config: &AppConfig,
    tools: &[ToolInfo],
) -> Result<(), DirectoryError> {
    for profile in config.connection_profiles() {
        admin.upsert_application(&profile).await?;
    }
    for tool in tools {
        admin.register_tool(tool).await?;
    }
    for agent in &config.agents {
        admin.upsert_agent(&agent.to_profile()).await?;
        admin.clear_capabilities(&agent.id).await?;
        for sub in &agent.sub_agents {
            admin
                .grant_capability(&agent.id, &Capability::Agent(sub.clone()))
                .await?;
        }
        for tool in &agent.tools {
            admin
                .grant_capability(&agent.id, &Capability::Tool(tool.clone()))
                .await?;
        }
    }
    info!(
        applications = config.applications.len(),
        agents = config.agents.len(),
        tools = tools.len(),
        "Agent directory seeded"
    );
    Ok(())
}
