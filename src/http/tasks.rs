use std::sync::Arc;

use axum::Json;
use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::http::AppContext;
use crate::http::response::{self, ApiError, ApiResponse};
use crate::models::{NewTask, StatsSummary, Task, TaskFilter, TaskPatch};

/// Open the connection-scoped database handle for this request.
fn open_db(ctx: &AppContext) -> Result<Database, ApiError> {
    Ok(Database::open(&ctx.db_path)?)
}

/// Typed `{id}` path segment. A non-numeric id names no known endpoint,
/// so the rejection is the unmatched-route envelope rather than axum's
/// plain-text parse error.
pub struct TaskId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for TaskId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(TaskId(id)),
            Err(_) => Err(response::endpoint_not_found().await),
        }
    }
}

/// Deserialize a JSON body into a typed payload, surfacing the
/// deserialization failure to the client as a 400.
fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
}

pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<Task>>>, ApiError> {
    let db = open_db(&ctx)?;
    let filter = TaskFilter::from_params(
        params.status.as_deref(),
        params.priority,
        params.category,
    );
    let tasks = db.tasks(&filter)?;
    let count = tasks.len();
    debug!(count, "listed tasks");
    Ok(Json(ApiResponse::with_count(tasks, count)))
}

pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    payload: Option<Json<Value>>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), ApiError> {
    let new: NewTask = match payload {
        Some(Json(body)) => parse_body(body)?,
        None => NewTask::default(),
    };
    let Some(title) = new.title() else {
        return Err(ApiError::validation("Title is required"));
    };

    let db = open_db(&ctx)?;
    // Read-back can miss if the row is deleted concurrently
    let task = db.create_task(title, &new)?.ok_or(ApiError::NotFound)?;
    debug!(id = task.id, "created task");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(task, "Task created successfully")),
    ))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    TaskId(id): TaskId,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    let db = open_db(&ctx)?;
    let task = db.task(id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(ApiResponse::data(task)))
}

pub async fn update_task(
    State(ctx): State<Arc<AppContext>>,
    TaskId(id): TaskId,
    payload: Option<Json<Value>>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    let body = payload.map(|Json(v)| v).unwrap_or(Value::Null);

    // An absent or empty JSON document is rejected before anything else
    // is looked at; a non-empty payload is checked against the store
    // before its fields are validated
    if body.is_null() || body.as_object().is_some_and(|map| map.is_empty()) {
        return Err(ApiError::validation("No data provided"));
    }
    let patch: TaskPatch = parse_body(body)?;

    let db = open_db(&ctx)?;
    if !db.contains(id)? {
        return Err(ApiError::NotFound);
    }
    if patch.title.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::validation("Title cannot be empty"));
    }
    let changes = patch.changes();
    if changes.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    let task = db.update_task(id, &changes)?.ok_or(ApiError::NotFound)?;
    debug!(id, fields = changes.len(), "updated task");
    Ok(Json(ApiResponse::with_message(
        task,
        "Task updated successfully",
    )))
}

pub async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    TaskId(id): TaskId,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let db = open_db(&ctx)?;
    if !db.delete_task(id)? {
        return Err(ApiError::NotFound);
    }
    debug!(id, "deleted task");
    Ok(Json(ApiResponse::message("Task deleted successfully")))
}

pub async fn list_categories(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let db = open_db(&ctx)?;
    Ok(Json(ApiResponse::data(db.categories()?)))
}

pub async fn get_stats(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<ApiResponse<StatsSummary>>, ApiError> {
    let db = open_db(&ctx)?;
    Ok(Json(ApiResponse::data(db.stats()?)))
}
