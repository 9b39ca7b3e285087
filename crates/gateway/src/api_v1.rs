//! HTTP API v1: task triggers and polling.
//!
//! Endpoints:
//!
//! - `POST /v1/tasks`               Create a task and queue it
//! - `GET  /v1/tasks`               Recent tasks, optionally by `status`
//! - `GET  /v1/tasks/{id}`          A task record
//! - `GET  /v1/tasks/{id}/steps`    Steps of a task in execution order
//! - `GET  /v1/tasks/{id}/children` Tasks delegated by a task
//! - `POST /v1/tasks/{id}/cancel`   Cancel a task that has not finished

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use simplea2a_core::error::{DirectoryError, Error, StoreError};
use simplea2a_core::task::{Context, NewTask, Task, TaskStatus, TaskStep, TaskStore};

use crate::SharedState;

/// Upper bound for `GET /v1/tasks?limit=`.
const MAX_LIST_LIMIT: usize = 500;

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/tasks", post(create_task_handler).get(list_tasks_handler))
        .route("/tasks/{id}", get(get_task_handler))
        .route("/tasks/{id}/steps", get(list_steps_handler))
        .route("/tasks/{id}/children", get(list_children_handler))
        .route("/tasks/{id}/cancel", post(cancel_task_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub agent_id: String,
    pub instruction: String,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub source_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepListResponse {
    pub task_id: String,
    pub steps: Vec<TaskStep>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Directory(DirectoryError::AgentNotFound(_))
        | Error::Store(StoreError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        Error::Delegation(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn to_api_error(err: impl Into<Error>) -> ApiError {
    let err = err.into();
    let status = error_status(&err);
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    (status, Json(err.into()))
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn create_task_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if payload.agent_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "agent_id must not be empty"));
    }
    if payload.instruction.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "instruction must not be empty",
        ));
    }

    let mut new =
        NewTask::new(payload.agent_id, payload.instruction).with_context(payload.context);
    if let Some(source_id) = payload.source_id {
        new = new.with_source(source_id);
    }

    let task = state.orchestrator.submit(new).await.map_err(to_api_error)?;
    info!(task_id = %task.id, agent_id = %task.agent_id, "Task accepted");
    Ok((StatusCode::ACCEPTED, Json(task)))
}

async fn list_tasks_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    let tasks = state
        .orchestrator
        .store()
        .list_tasks(query.status, limit)
        .await
        .map_err(to_api_error)?;
    Ok(Json(TaskListResponse { tasks }))
}

async fn get_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .orchestrator
        .store()
        .get_task(&id)
        .await
        .map_err(to_api_error)?;
    Ok(Json(task))
}

async fn list_steps_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<StepListResponse>, ApiError> {
    let store = state.orchestrator.store();
    // 404 for unknown tasks rather than an empty list
    store.get_task(&id).await.map_err(to_api_error)?;
    let steps = store.list_steps(&id).await.map_err(to_api_error)?;
    Ok(Json(StepListResponse { task_id: id, steps }))
}

async fn list_children_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let store = state.orchestrator.store();
    store.get_task(&id).await.map_err(to_api_error)?;
    let tasks = store.list_children(&id).await.map_err(to_api_error)?;
    Ok(Json(TaskListResponse { tasks }))
}

async fn cancel_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let store = state.orchestrator.store();
    let task = store.get_task(&id).await.map_err(to_api_error)?;
    if task.status.is_terminal() {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Task {id} already finished as {}", task.status),
        ));
    }
    let task = store.cancel_task(&id).await.map_err(to_api_error)?;
    info!(task_id = %task.id, "Task cancelled");
    Ok(Json(task))
}
