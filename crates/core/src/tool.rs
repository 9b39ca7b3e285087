//! Tool trait and the ToolRegistry (the tool dispatcher).
//!
//! Tools are registered by name at start-up. The orchestrator dispatches a
//! `skill-call` to the registry; any error becomes an observation for the
//! model instead of failing the task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::ToolInfo;
use crate::error::ToolError;

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text fed back to the model
    pub output: String,

    /// Optional structured data, persisted as the step's action result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: None,
        }
    }

    /// A structured result whose observation text is the compact JSON.
    pub fn json(data: Value) -> Self {
        Self {
            output: data.to_string(),
            data: Some(data),
        }
    }

    /// The value recorded on the step.
    pub fn to_value(&self) -> Value {
        self.data
            .clone()
            .unwrap_or_else(|| Value::String(self.output.clone()))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "http_request").
    fn name(&self) -> &str;

    /// A description of what this tool does (listed in the system prompt).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<ToolResult, ToolError>;

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Cloning is cheap and shares the registered tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool by name.
    pub async fn call(&self, name: &str, params: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.values().map(|t| t.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
