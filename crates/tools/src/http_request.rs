//! HTTP request tool. Lets an agent call arbitrary HTTP endpoints.
//!
//! Any response, including 4xx/5xx, is returned to the model as data; only a
//! request that cannot be sent at all is an error.

use async_trait::async_trait;
use serde_json::{Value, json};
use simplea2a_core::error::ToolError;
use simplea2a_core::tool::{Tool, ToolResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bodies longer than this are cut before they reach the conversation.
const MAX_BODY_CHARS: usize = 8_000;

pub struct HttpRequestTool {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpRequestTool {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout,
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL. Supports GET, POST, PUT, PATCH, and DELETE methods. \
         Returns the response status code, content type, and body."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to send the request to"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"],
                    "default": "GET"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "body": {
                    "description": "Request body; objects and arrays are sent as JSON"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Request timeout in seconds"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult, ToolError> {
        let url = params["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let method = params["method"].as_str().unwrap_or("GET").to_uppercase();
        let method = match method.as_str() {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "PATCH" => reqwest::Method::PATCH,
            "DELETE" => reqwest::Method::DELETE,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Invalid HTTP method: {other}. Must be GET, POST, PUT, PATCH, or DELETE."
                )));
            }
        };

        let headers: HashMap<String, String> = match params.get("headers") {
            None | Some(Value::Null) => HashMap::new(),
            Some(h) => serde_json::from_value(h.clone()).map_err(|e| {
                ToolError::InvalidArguments(format!("'headers' must map names to strings: {e}"))
            })?,
        };

        let timeout = params["timeout_secs"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let mut request = self.client.request(method.clone(), url).timeout(timeout);
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        request = match params.get("body") {
            None | Some(Value::Null) => request,
            Some(Value::String(s)) => request.body(s.clone()),
            Some(other) => request.json(other),
        };

        debug!(%method, url, "Sending HTTP request");
        let started = Instant::now();
        let response = request.send().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("reading body: {e}"),
        })?;

        let truncated = body.chars().count() > MAX_BODY_CHARS;
        let body: String = if truncated {
            body.chars().take(MAX_BODY_CHARS).collect()
        } else {
            body
        };

        Ok(ToolResult::json(json!({
            "status_code": status.as_u16(),
            "ok": status.is_success(),
            "content_type": content_type,
            "body": body,
            "truncated": truncated,
            "elapsed_ms": started.elapsed().as_millis() as u64,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn tool_definition() {
        let tool = HttpRequestTool::default();
        assert_eq!(tool.name(), "http_request");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "url");
    }

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
            .mount(&server)
            .await;

        let result = HttpRequestTool::default()
            .execute(json!({"url": format!("{}/health", server.uri())}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["status_code"], 200);
        assert_eq!(data["body"], "healthy");
        assert_eq!(data["truncated"], false);
    }

    #[tokio::test]
    async fn post_sends_json_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/items"))
            .and(header("x-token", "abc"))
            .and(body_json(json!({"name": "widget"})))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":7}"#))
            .mount(&server)
            .await;

        let result = HttpRequestTool::default()
            .execute(json!({
                "url": format!("{}/api/items", server.uri()),
                "method": "post",
                "headers": {"x-token": "abc"},
                "body": {"name": "widget"}
            }))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["status_code"], 201);
    }

    #[tokio::test]
    async fn error_status_is_data_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let result = HttpRequestTool::default()
            .execute(json!({"url": server.uri()}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["status_code"], 404);
        assert_eq!(data["ok"], false);
    }

    #[tokio::test]
    async fn invalid_arguments() {
        let tool = HttpRequestTool::default();
        assert!(matches!(
            tool.execute(json!({})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(json!({"url": "ftp://x"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(json!({"url": "http://x", "method": "TRACE"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_host_fails_execution() {
        let err = HttpRequestTool::new(Duration::from_secs(2))
            .execute(json!({"url": "http://127.0.0.1:1/"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
