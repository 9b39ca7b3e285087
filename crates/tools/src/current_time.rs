//! Current time tool.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use simplea2a_core::error::ToolError;
use simplea2a_core::tool::{Tool, ToolResult};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current UTC date and time in RFC 3339 format."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value) -> Result<ToolResult, ToolError> {
        let now = Utc::now();
        Ok(ToolResult {
            output: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            data: Some(json!({
                "utc": now.to_rfc3339_opts(SecondsFormat::Secs, true),
                "unix": now.timestamp(),
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_parseable_utc_time() {
        let result = CurrentTimeTool.execute(json!({})).await.unwrap();
        assert!(result.output.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&result.output).is_ok());
        assert!(result.data.unwrap()["unix"].as_i64().unwrap() > 0);
    }
}
