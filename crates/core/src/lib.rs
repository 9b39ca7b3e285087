//! # simplea2a Core
//!
//! Domain types, traits, and error definitions for the simplea2a task
//! orchestrator. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the orchestration core is a trait here:
//! - [`TaskStore`]: durable tasks and steps
//! - [`AgentDirectory`]: agent identity, capabilities, connection profiles
//! - [`Provider`]: one model backend call
//! - [`Tool`]: a locally registered capability
//!
//! Implementations live in their respective crates, so tests can swap in
//! in-memory or scripted versions.

pub mod action;
pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ParsedReply, ResultAction, SkillCall, TaskTransfer};
pub use agent::{
    AgentDirectory, AgentProfile, ConnectionProfile, Environment, ResolvedAgent, SubAgentInfo,
    ToolInfo,
};
pub use error::{DelegationError, DirectoryError, Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{Completion, Provider, ProviderRequest};
pub use task::{
    Context, NewTask, StatusUpdate, StepPatch, StepStatus, Task, TaskInput, TaskStatus, TaskStep,
    TaskStore,
};
pub use tool::{Tool, ToolRegistry, ToolResult};
