//! Status lookup for tasks created by `POST /convert/async`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::task::TaskStatusResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_task), components(schemas(TaskStatusResponse)))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/task/{task_id}", get(get_task))
}

#[utoipa::path(
    get,
    path = "/task/{task_id}",
    tag = "tasks",
    params(
        ("task_id" = String, Path, description = "ID returned by POST /convert/async")
    ),
    responses(
        (status = 200, description = "Task retrieved", body = TaskStatusResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let task = state.orchestrator.registry().get(&task_id)?;
    Ok(Json(task.into()))
}
