//! Error types for the simplea2a domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.
//!
//! Directive parse failures deliberately have no variant here: the action
//! parser recovers from them locally and only logs.

use thiserror::Error;

/// The top-level error type for all simplea2a operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Delegation error: {0}")]
    Delegation(#[from] DelegationError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a model backend call. Fatal to the task that made the call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response shape: {0}")]
    InvalidResponse(String),
}

/// Failures of a single tool call. Folded into the next observation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Step {step_id} not found in task {task_id}")]
    StepNotFound { task_id: String, step_id: String },

    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored payload could not be decoded: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Application {application_id} of agent {agent_id} not found")]
    ApplicationNotFound {
        agent_id: String,
        application_id: String,
    },

    #[error("Directory storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum DelegationError {
    #[error("Delegation depth limit of {max_depth} reached while delegating to {target}")]
    DepthExceeded { target: String, max_depth: usize },

    #[error("Failed to create child task for {target}: {reason}")]
    ChildCreation { target: String, reason: String },

    #[error("Task queue is closed, the scheduler is not running")]
    QueueClosed,
}
