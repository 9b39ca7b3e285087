//! Locally registered tools for simplea2a agents.
//!
//! Tools are registered by name at start-up. Which agent may call which tool
//! is decided by the agent directory, not here.

pub mod current_time;
pub mod http_request;
pub mod vika;

use simplea2a_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

pub use current_time::CurrentTimeTool;
pub use http_request::HttpRequestTool;
pub use vika::VikaRecordsTool;

/// Build the registry of built-in tools.
///
/// `vika_records` is only registered when a table-store URL is configured.
pub fn default_registry(http_timeout: Duration, vika_base_url: Option<&str>) -> ToolRegistry {
    let mut registry = ToolRegistry::new()
        .with_tool(Arc::new(CurrentTimeTool))
        .with_tool(Arc::new(HttpRequestTool::new(http_timeout)));
    if let Some(base_url) = vika_base_url {
        registry.register(Arc::new(VikaRecordsTool::new(base_url, http_timeout)));
    }
    registry
}
