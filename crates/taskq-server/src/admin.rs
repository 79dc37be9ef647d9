//! Operator HTTP surface: inspect tasks, release quarantined ones, delete rows.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskq::{Engine, EngineError, ListTasksParams, QueueNotifier, Task, TaskFilter, TaskRepository};
use taskq_store::StoreError;
use tracing::{error, info};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 1000;

pub fn router<S: TaskRepository, N: QueueNotifier>(engine: Arc<Engine<S, N>>) -> Router {
    Router::new()
        .route("/health", get(health::<S, N>))
        .route("/tasks", get(list_tasks::<S, N>))
        .route(
            "/tasks/{id}",
            get(get_task::<S, N>).delete(delete_task::<S, N>),
        )
        .route("/tasks/{id}/clear-error", post(clear_error::<S, N>))
        .with_state(engine)
}

#[derive(Debug)]
pub enum AdminError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<EngineError> for AdminError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(StoreError::NotFound { .. }) => Self::NotFound(err.to_string()),
            EngineError::Store(StoreError::InvalidArgument { .. })
            | EngineError::Serialization(_) => Self::BadRequest(err.to_string()),
            EngineError::Store(StoreError::LockConflict { .. }) => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::Internal(message) => {
                error!(error = %message, "Admin request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pending: i64,
    quarantined: i64,
    draining: bool,
    task_types: Vec<String>,
}

async fn health<S: TaskRepository, N: QueueNotifier>(
    State(engine): State<Arc<Engine<S, N>>>,
) -> Result<Json<HealthResponse>, AdminError> {
    let pending = engine.count(TaskFilter::Pending).await?;
    let quarantined = engine.count(TaskFilter::Quarantined).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        pending,
        quarantined,
        draining: engine.is_running(),
        task_types: engine.registry().task_types(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    filter: TaskFilter,
    task_type: Option<String>,
    limit: Option<i64>,
}

async fn list_tasks<S: TaskRepository, N: QueueNotifier>(
    State(engine): State<Arc<Engine<S, N>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, AdminError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(AdminError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }

    let mut params = ListTasksParams {
        filter: query.filter,
        ..Default::default()
    }
    .with_limit(limit);
    if let Some(task_type) = query.task_type {
        params = params.with_task_type(task_type);
    }

    Ok(Json(engine.list(params).await?))
}

async fn get_task<S: TaskRepository, N: QueueNotifier>(
    State(engine): State<Arc<Engine<S, N>>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AdminError> {
    engine
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("Task not found: {id}")))
}

async fn clear_error<S: TaskRepository, N: QueueNotifier>(
    State(engine): State<Arc<Engine<S, N>>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminError> {
    if engine.clear_error(id).await? {
        info!(task_id = id, "Quarantined task released");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminError::NotFound(format!("Task not found: {id}")))
    }
}

async fn delete_task<S: TaskRepository, N: QueueNotifier>(
    State(engine): State<Arc<Engine<S, N>>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminError> {
    if engine.delete(id).await? {
        info!(task_id = id, "Task deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminError::NotFound(format!("Task not found: {id}")))
    }
}
