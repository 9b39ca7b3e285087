//! Configuration loading, validation, and management for simplea2a.
//!
//! Loads configuration from `~/.simplea2a/config.toml` (or the path in
//! `SIMPLEA2A_CONFIG`) with environment variable overrides. Validates all
//! settings at startup, including the references between agents and
//! applications that seed the agent directory.

use serde::{Deserialize, Serialize};
use simplea2a_core::{AgentProfile, ConnectionProfile, Environment};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.simplea2a/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for applications that carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used when neither the agent nor its application names one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model reply
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Model backends (connection profiles)
    #[serde(default = "default_applications")]
    pub applications: Vec<ApplicationConfig>,

    /// Agents and their capabilities
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

fn default_applications() -> Vec<ApplicationConfig> {
    vec![ApplicationConfig {
        id: "openai".into(),
        name: "OpenAI".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key: None,
        app_secret: None,
        environment: Environment::Chat,
        default_model: None,
    }]
}

fn default_agents() -> Vec<AgentConfig> {
    vec![AgentConfig {
        id: "assistant".into(),
        name: "Assistant".into(),
        responsibilities: "A general-purpose assistant that answers questions and \
                           uses the available tools when they help."
            .into(),
        application: "openai".into(),
        model: None,
        platform_agent_id: None,
        sub_agents: vec![],
        tools: vec!["current_time".into(), "http_request".into()],
    }]
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("rate_limit", &self.rate_limit)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("tools", &self.tools)
            .field("applications", &self.applications)
            .field("agents", &self.agents)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Reasoning iterations per task before the budget is exhausted
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Hard ceiling on nested synchronous delegation
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: usize,

    /// Tasks the scheduler runs at the same time
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

fn default_max_steps() -> usize {
    10
}
fn default_max_delegation_depth() -> usize {
    3
}
fn default_max_concurrent_tasks() -> usize {
    8
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_delegation_depth: default_max_delegation_depth(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

/// Ceiling on model calls across every task in the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Length of the rolling window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_requests_per_second() -> u32 {
    2
}
fn default_window_ms() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            window_ms: default_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    AppConfig::config_dir().join("simplea2a.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8420
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Table-store service; `vika_records` is registered only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vika_base_url: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vika_base_url: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// A model backend (connection profile).
#[derive(Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub id: String,

    #[serde(default)]
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

impl std::fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("app_secret", &redact(&self.app_secret))
            .field("environment", &self.environment)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub responsibilities: String,

    /// Application id backing this agent
    pub application: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_agent_id: Option<String>,

    /// Agents this agent may delegate to
    #[serde(default)]
    pub sub_agents: Vec<String>,

    /// Tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AppConfig {
    /// Load configuration from `SIMPLEA2A_CONFIG` or the default path,
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SIMPLEA2A_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_with_env(&path)
    }

    /// Load configuration from a specific path, then apply environment overrides.
    ///
    /// Overrides:
    /// - `SIMPLEA2A_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `SIMPLEA2A_MODEL`
    /// - `SIMPLEA2A_RPS`
    /// - `SIMPLEA2A_DB`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("SIMPLEA2A_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("SIMPLEA2A_MODEL") {
            self.default_model = model;
        }

        if let Some(rps) = lookup("SIMPLEA2A_RPS") {
            self.rate_limit.requests_per_second = rps.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("SIMPLEA2A_RPS is not a number: '{rps}'"))
            })?;
        }

        if let Some(db) = lookup("SIMPLEA2A_DB") {
            self.store.path = PathBuf::from(db);
        }

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".simplea2a")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_steps must be at least 1".into(),
            ));
        }

        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_concurrent_tasks must be at least 1".into(),
            ));
        }

        if self.rate_limit.requests_per_second == 0 || self.rate_limit.window_ms == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.requests_per_second and rate_limit.window_ms must be at least 1"
                    .into(),
            ));
        }

        let mut app_ids = HashSet::new();
        for app in &self.applications {
            if !app_ids.insert(app.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate application id '{}'",
                    app.id
                )));
            }
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if !app_ids.contains(agent.application.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' references unknown application '{}'",
                    agent.id, agent.application
                )));
            }
        }

        for agent in &self.agents {
            if let Some(missing) = agent
                .sub_agents
                .iter()
                .find(|id| !agent_ids.contains(id.as_str()))
            {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' lists unknown sub-agent '{missing}'",
                    agent.id
                )));
            }
        }

        Ok(())
    }

    /// Connection profiles, with the top-level key filled in where an
    /// application carries none.
    pub fn connection_profiles(&self) -> Vec<ConnectionProfile> {
        self.applications
            .iter()
            .map(|app| ConnectionProfile {
                application_id: app.id.clone(),
                name: if app.name.is_empty() {
                    app.id.clone()
                } else {
                    app.name.clone()
                },
                base_url: app.base_url.trim_end_matches('/').to_string(),
                api_key: app.api_key.clone().or_else(|| self.api_key.clone()),
                app_secret: app.app_secret.clone(),
                environment: app.environment,
                default_model: app.default_model.clone(),
            })
            .collect()
    }

    pub fn agent_profiles(&self) -> Vec<AgentProfile> {
        self.agents.iter().map(AgentConfig::to_profile).collect()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl AgentConfig {
    pub fn to_profile(&self) -> AgentProfile {
        AgentProfile {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            responsibilities: self.responsibilities.clone(),
            application_id: self.application.clone(),
            model: self.model.clone(),
            platform_agent_id: self.platform_agent_id.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            orchestrator: OrchestratorConfig::default(),
            rate_limit: RateLimitConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            tools: ToolsConfig::default(),
            applications: default_applications(),
            agents: default_agents(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.max_steps, 10);
        assert_eq!(config.orchestrator.max_delegation_depth, 3);
        assert_eq!(config.rate_limit.requests_per_second, 2);
        assert_eq!(config.rate_limit.window_ms, 1000);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.agents.len(), 1);
        assert_eq!(parsed.applications[0].environment, Environment::Chat);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_budget_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[[agents]]"));
        assert!(toml_str.contains("max_steps"));
    }

    #[test]
    fn applications_and_agents_parse() {
        let toml_str = r#"
[[applications]]
id = "llm"
base_url = "https://llm.example.com/v1/"
default_model = "qwen-max"

[[applications]]
id = "platform"
name = "Agent Platform"
base_url = "https://agents.example.com"
api_key = "key-1"
app_secret = "secret-1"
environment = "platform"

[[agents]]
id = "planner"
name = "Planner"
responsibilities = "Breaks work into steps"
application = "llm"
sub_agents = ["researcher"]
tools = ["http_request"]

[[agents]]
id = "researcher"
application = "platform"
platform_agent_id = "p-42"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        let profiles = config.connection_profiles();
        assert_eq!(profiles[0].base_url, "https://llm.example.com/v1");
        assert_eq!(profiles[0].name, "llm");
        assert_eq!(profiles[1].environment, Environment::Platform);

        let agents = config.agent_profiles();
        assert_eq!(agents[0].application_id, "llm");
        assert_eq!(agents[1].name, "researcher");
        assert_eq!(agents[1].platform_agent_id.as_deref(), Some("p-42"));
    }

    #[test]
    fn unknown_references_rejected() {
        let toml_str = r#"
[[applications]]
id = "llm"
base_url = "https://llm.example.com"

[[agents]]
id = "planner"
application = "llm"
sub_agents = ["ghost"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));

        let mut config = AppConfig::default();
        config.agents[0].application = "missing".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("SIMPLEA2A_MODEL", "gpt-4o"),
            ("SIMPLEA2A_RPS", "5"),
            ("SIMPLEA2A_DB", "/tmp/test.db"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.rate_limit.requests_per_second, 5);
        assert_eq!(config.store.path, PathBuf::from("/tmp/test.db"));

        // Application without its own key inherits the top-level one
        assert_eq!(
            config.connection_profiles()[0].api_key.as_deref(),
            Some("sk-env")
        );
    }

    #[test]
    fn configured_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config
            .apply_env(|k| (k == "SIMPLEA2A_API_KEY").then(|| "sk-env".to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn bad_rps_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|k| (k == "SIMPLEA2A_RPS").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_file_reads_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "default_model = \"m\"\n[orchestrator]\nmax_steps = 4\n[store]\nbackend = \"memory\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "m");
        assert_eq!(config.orchestrator.max_steps, 4);
        assert_eq!(config.orchestrator.max_delegation_depth, 3);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-top-secret".into()),
            ..AppConfig::default()
        };
        config.applications[0].app_secret = Some("app-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-top-secret"));
        assert!(!debug.contains("app-secret"));
    }
}
