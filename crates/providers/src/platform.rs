//! Internal agent-platform backend.
//!
//! Calls are keyed by application credentials plus the platform's agent id
//! rather than by a model name. Replies come in a handful of shapes
//! depending on the platform version; all are normalized to a [`Completion`].

use async_trait::async_trait;
use serde_json::Value;
use simplea2a_core::error::ProviderError;
use simplea2a_core::provider::{Completion, Provider, ProviderRequest};
use std::time::Duration;
use tracing::debug;

use crate::http::{build_client, check_status, map_send_error, wire_messages};

pub const APP_KEY_HEADER: &str = "x-app-key";
pub const APP_SECRET_HEADER: &str = "x-app-secret";

pub struct PlatformProvider {
    name: String,
    base_url: String,
    app_key: String,
    app_secret: Option<String>,
    client: reqwest::Client,
}

impl PlatformProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        app_key: Option<String>,
        app_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let app_key = app_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            ProviderError::NotConfigured(format!("application '{name}' has no app key"))
        })?;
        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_key,
            app_secret,
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for PlatformProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<Completion, ProviderError> {
        let agent_id = request.platform_agent_id.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("platform call without an agent id".into())
        })?;
        let url = format!("{}/agent/chat", self.base_url);

        let body = serde_json::json!({
            "app_key": self.app_key,
            "agent_id": agent_id,
            "messages": wire_messages(&request.messages),
        });

        debug!(provider = %self.name, agent_id, "Sending platform agent request");

        let mut builder = self
            .client
            .post(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .json(&body);
        if let Some(secret) = &self.app_secret {
            builder = builder.header(APP_SECRET_HEADER, secret);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let response = check_status(&self.name, response).await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let content = extract_content(&payload)?;
        Ok(Completion {
            content,
            model: Some(format!("{}:{agent_id}", self.name)),
            total_tokens: None,
        })
    }
}

/// Pull the reply text out of any of the known reply shapes.
pub(crate) fn extract_content(payload: &Value) -> Result<String, ProviderError> {
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let message = ["message", "error", "detail"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(Value::as_str))
            .unwrap_or("platform reported failure");
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: message.to_string(),
        });
    }

    let candidates = [
        payload.get("content"),
        payload.pointer("/data/content"),
        payload.get("output"),
        payload.get("answer"),
        payload.pointer("/choices/0/message/content"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("no reply content in platform response".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simplea2a_core::message::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extracts_every_known_shape() {
        for payload in [
            json!({"content": "a"}),
            json!({"data": {"content": "a"}}),
            json!({"output": "a"}),
            json!({"answer": "a"}),
            json!({"choices": [{"message": {"content": "a"}}]}),
        ] {
            assert_eq!(extract_content(&payload).unwrap(), "a", "{payload}");
        }
    }

    #[test]
    fn explicit_failure_and_missing_content_are_errors() {
        let err = extract_content(&json!({"success": false, "message": "quota"})).unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { ref message, .. } if message == "quota"));

        let err = extract_content(&json!({"success": true, "data": {}})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn requires_app_key() {
        let err = PlatformProvider::new("p", "http://x", None, None, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn sends_credentials_and_agent_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agent/chat"))
            .and(header(APP_KEY_HEADER, "key-1"))
            .and(header(APP_SECRET_HEADER, "secret-1"))
            .and(body_partial_json(json!({"app_key": "key-1", "agent_id": "p-42"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": {"content": "done"}})),
            )
            .mount(&server)
            .await;

        let provider = PlatformProvider::new(
            "platform",
            server.uri(),
            Some("key-1".into()),
            Some("secret-1".into()),
            Duration::from_secs(5),
        )
        .unwrap();

        let completion = provider
            .complete(ProviderRequest {
                model: String::new(),
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                platform_agent_id: Some("p-42".into()),
            })
            .await
            .unwrap();
        assert_eq!(completion.content, "done");
        assert_eq!(completion.model.as_deref(), Some("platform:p-42"));
    }
}
