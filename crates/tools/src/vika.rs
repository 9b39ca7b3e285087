//! Client for the table-store (Vika) microservice.
//!
//! The service wraps a hosted spreadsheet-database and answers every call
//! with `{"success": bool, "data": ...}`. Failures come back as non-2xx
//! with a `detail` message.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use simplea2a_core::error::ToolError;
use simplea2a_core::tool::{Tool, ToolResult};
use std::time::Duration;
use tracing::debug;

const TOOL_NAME: &str = "vika_records";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Fields,
    Views,
    Spaces,
    Datasheets,
    Batch,
}

impl Operation {
    const NAMES: &'static str =
        "list, get, create, update, delete, fields, views, spaces, datasheets or batch";

    fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw {
            "list" => Ok(Operation::List),
            "get" => Ok(Operation::Get),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "fields" => Ok(Operation::Fields),
            "views" => Ok(Operation::Views),
            "spaces" => Ok(Operation::Spaces),
            "datasheets" => Ok(Operation::Datasheets),
            "batch" => Ok(Operation::Batch),
            other => Err(ToolError::InvalidArguments(format!(
                "unknown operation '{other}', expected {}",
                Self::NAMES
            ))),
        }
    }
}

/// Operation types the service accepts inside a `batch` call.
const BATCH_TYPES: [&str; 3] = ["create_record", "update_record", "delete_record"];

pub struct VikaRecordsTool {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl VikaRecordsTool {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| failed(format!("invalid base url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| failed(format!("base url '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ToolError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| failed(format!("status {status}, unreadable body: {e}")))?;

        if !status.is_success() {
            let detail = body
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            return Err(failed(format!("status {status}: {detail}")));
        }
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(failed(format!("service reported failure: {body}")));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason,
    }
}

fn required<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// `records` as given, or a single `fields` object wrapped into one record.
fn records_payload(params: &Value) -> Result<Value, ToolError> {
    if let Some(records) = params.get("records").and_then(Value::as_array) {
        let records: Vec<Value> = records
            .iter()
            .map(|r| match r.get("fields") {
                Some(_) => r.clone(),
                None => json!({ "fields": r }),
            })
            .collect();
        return Ok(Value::Array(records));
    }
    match params.get("fields") {
        Some(fields @ Value::Object(_)) => Ok(json!([{ "fields": fields }])),
        _ => Err(ToolError::InvalidArguments(
            "create needs 'records' (array) or 'fields' (object)".into(),
        )),
    }
}

/// Validate the `operations` array of a batch call. Each entry needs a
/// supported `type` and a `data` object.
fn batch_payload(params: &Value) -> Result<Value, ToolError> {
    let operations = params
        .get("operations")
        .and_then(Value::as_array)
        .filter(|ops| !ops.is_empty())
        .ok_or_else(|| {
            ToolError::InvalidArguments("batch needs a non-empty 'operations' array".into())
        })?;
    for (i, op) in operations.iter().enumerate() {
        let kind = op["type"].as_str().unwrap_or_default();
        if !BATCH_TYPES.contains(&kind) {
            return Err(ToolError::InvalidArguments(format!(
                "operations[{i}]: type must be one of {}",
                BATCH_TYPES.join(", ")
            )));
        }
        if !op["data"].is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "operations[{i}]: missing 'data' object"
            )));
        }
    }
    Ok(json!({ "operations": operations }))
}

#[async_trait]
impl Tool for VikaRecordsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read and write records in a Vika datasheet. Operations: list (datasheet_id, optional \
         view_id, page_size, page_token, filter_formula), get (datasheet_id, record_id), \
         create (datasheet_id, records or fields), update (datasheet_id, record_id, fields), \
         delete (datasheet_id, record_id), fields (datasheet_id), views (datasheet_id), \
         spaces, datasheets (space_id), batch (operations of create_record, update_record \
         or delete_record, each with a data object)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "list", "get", "create", "update", "delete",
                        "fields", "views", "spaces", "datasheets", "batch"
                    ]
                },
                "datasheet_id": { "type": "string" },
                "space_id": { "type": "string" },
                "record_id": { "type": "string" },
                "fields": { "type": "object" },
                "records": { "type": "array", "items": { "type": "object" } },
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": { "type": "string", "enum": BATCH_TYPES },
                            "data": { "type": "object" }
                        },
                        "required": ["type", "data"]
                    }
                },
                "view_id": { "type": "string" },
                "page_size": { "type": "integer", "default": 100 },
                "page_token": { "type": "string" },
                "filter_formula": { "type": "string" }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult, ToolError> {
        let operation = Operation::parse(required(&params, "operation")?)?;
        debug!(?operation, "Calling table store");

        let data = match operation {
            Operation::List => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let mut query: Vec<(&str, String)> = Vec::new();
                for key in ["view_id", "page_token", "filter_formula"] {
                    if let Some(v) = params[key].as_str() {
                        query.push((key, v.to_string()));
                    }
                }
                if let Some(size) = params["page_size"].as_u64() {
                    query.push(("page_size", size.to_string()));
                }
                let url = self.url(&["records", datasheet_id])?;
                self.send(self.client.get(url).query(&query)).await?
            }
            Operation::Get => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let record_id = required(&params, "record_id")?;
                let url = self.url(&["records", datasheet_id, record_id])?;
                self.send(self.client.get(url)).await?
            }
            Operation::Create => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let body = json!({
                    "datasheet_id": datasheet_id,
                    "records": records_payload(&params)?,
                });
                let url = self.url(&["records"])?;
                self.send(self.client.post(url).json(&body)).await?
            }
            Operation::Update => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let record_id = required(&params, "record_id")?;
                let fields = params
                    .get("fields")
                    .filter(|f| f.is_object())
                    .ok_or_else(|| {
                        ToolError::InvalidArguments("update needs a 'fields' object".into())
                    })?;
                let body = json!({
                    "datasheet_id": datasheet_id,
                    "record_id": record_id,
                    "fields": fields,
                });
                let url = self.url(&["records"])?;
                self.send(self.client.put(url).json(&body)).await?
            }
            Operation::Delete => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let record_id = required(&params, "record_id")?;
                let url = self.url(&["records", datasheet_id, record_id])?;
                self.send(self.client.delete(url)).await?
            }
            Operation::Fields | Operation::Views => {
                let datasheet_id = required(&params, "datasheet_id")?;
                let leaf = if operation == Operation::Fields {
                    "fields"
                } else {
                    "views"
                };
                let url = self.url(&["datasheets", datasheet_id, leaf])?;
                self.send(self.client.get(url)).await?
            }
            Operation::Spaces => {
                let url = self.url(&["spaces"])?;
                self.send(self.client.get(url)).await?
            }
            Operation::Datasheets => {
                let space_id = required(&params, "space_id")?;
                let url = self.url(&["spaces", space_id, "datasheets"])?;
                self.send(self.client.get(url)).await?
            }
            Operation::Batch => {
                let body = batch_payload(&params)?;
                let url = self.url(&["batch"])?;
                self.send(self.client.post(url).json(&body)).await?
            }
        };

        Ok(ToolResult::json(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer) -> VikaRecordsTool {
        VikaRecordsTool::new(server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn list_passes_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/records/dst1"))
            .and(query_param("view_id", "viw1"))
            .and(query_param("page_size", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"recordId": "rec1", "fields": {"Name": "A"}}],
                "from_cache": false
            })))
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({
                "operation": "list",
                "datasheet_id": "dst1",
                "view_id": "viw1",
                "page_size": 20
            }))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()[0]["recordId"], "rec1");
    }

    #[tokio::test]
    async fn create_wraps_single_fields_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/records"))
            .and(body_json(json!({
                "datasheet_id": "dst1",
                "records": [{"fields": {"Name": "B"}}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": [{"recordId": "rec2"}]})),
            )
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({
                "operation": "create",
                "datasheet_id": "dst1",
                "fields": {"Name": "B"}
            }))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()[0]["recordId"], "rec2");
    }

    #[tokio::test]
    async fn update_and_delete_use_record_paths() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/records"))
            .and(body_json(json!({
                "datasheet_id": "dst1",
                "record_id": "rec1",
                "fields": {"Done": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/records/dst1/rec1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": true})))
            .mount(&server)
            .await;

        let t = tool(&server);
        t.execute(json!({
            "operation": "update",
            "datasheet_id": "dst1",
            "record_id": "rec1",
            "fields": {"Done": true}
        }))
        .await
        .unwrap();
        let deleted = t
            .execute(json!({"operation": "delete", "datasheet_id": "dst1", "record_id": "rec1"}))
            .await
            .unwrap();
        assert_eq!(deleted.output, "true");
    }

    #[tokio::test]
    async fn schema_discovery_operations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datasheets/dst1/fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "fld1", "name": "Name", "type": "SingleText"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasheets/dst1/views"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "viw1", "name": "Grid", "type": "Grid"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "spc1", "name": "Ops"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spaces/spc1/datasheets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "fod1", "type": "Folder", "children": [{"id": "dst1", "type": "Datasheet"}]}]
            })))
            .mount(&server)
            .await;

        let t = tool(&server);
        let fields = t
            .execute(json!({"operation": "fields", "datasheet_id": "dst1"}))
            .await
            .unwrap();
        assert_eq!(fields.data.unwrap()[0]["name"], "Name");

        let views = t
            .execute(json!({"operation": "views", "datasheet_id": "dst1"}))
            .await
            .unwrap();
        assert_eq!(views.data.unwrap()[0]["id"], "viw1");

        let spaces = t.execute(json!({"operation": "spaces"})).await.unwrap();
        assert_eq!(spaces.data.unwrap()[0]["id"], "spc1");

        let tree = t
            .execute(json!({"operation": "datasheets", "space_id": "spc1"}))
            .await
            .unwrap();
        assert_eq!(tree.data.unwrap()[0]["children"][0]["id"], "dst1");
    }

    #[tokio::test]
    async fn batch_forwards_operations() {
        let server = MockServer::start().await;
        let operations = json!([
            {"type": "create_record", "data": {"datasheet_id": "dst1", "records": [{"fields": {"Name": "C"}}]}},
            {"type": "delete_record", "data": {"datasheet_id": "dst1", "record_ids": ["rec1"]}}
        ]);
        Mock::given(method("POST"))
            .and(path("/batch"))
            .and(body_json(json!({ "operations": operations })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"success": true, "data": [{"recordId": "rec3"}]},
                    {"success": false, "error": "record not found"}
                ]
            })))
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({"operation": "batch", "operations": operations}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data[0]["data"][0]["recordId"], "rec3");
        assert_eq!(data[1]["success"], false);
    }

    #[tokio::test]
    async fn service_errors_become_execution_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/records/dst1/missing"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"detail": "record not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/records/dst2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let t = tool(&server);
        let err = t
            .execute(json!({"operation": "get", "datasheet_id": "dst1", "record_id": "missing"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("record not found"));

        let err = t
            .execute(json!({"operation": "list", "datasheet_id": "dst2"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn argument_validation() {
        let t = VikaRecordsTool::new("http://localhost:9", Duration::from_secs(1));
        for params in [
            json!({"datasheet_id": "d"}),
            json!({"operation": "list"}),
            json!({"operation": "purge", "datasheet_id": "d"}),
            json!({"operation": "get", "datasheet_id": "d"}),
            json!({"operation": "create", "datasheet_id": "d"}),
            json!({"operation": "update", "datasheet_id": "d", "record_id": "r"}),
            json!({"operation": "fields"}),
            json!({"operation": "datasheets"}),
            json!({"operation": "batch", "operations": []}),
            json!({"operation": "batch", "operations": [{"type": "drop_table", "data": {}}]}),
            json!({"operation": "batch", "operations": [{"type": "create_record"}]}),
        ] {
            assert!(
                matches!(t.execute(params.clone()).await, Err(ToolError::InvalidArguments(_))),
                "{params}"
            );
        }
    }
}
