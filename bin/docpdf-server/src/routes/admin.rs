//! Service statistics and the manual retention sweep.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use docpdf_core::Root;
use tracing::info;
use utoipa::OpenApi;

use crate::schemas::admin::{
    CleanupResponse, DirStatsResponse, StatsResponse, TaskCountsResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_stats, manual_cleanup),
    components(schemas(StatsResponse, TaskCountsResponse, DirStatsResponse, CleanupResponse))
)]
pub struct AdminApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/cleanup", post(manual_cleanup))
}

/// Task counts, storage usage and retention settings.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "admin",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse),
        (status = 401, description = "Missing or invalid API key"),
    )
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let files = state.orchestrator.files();
    let (upload_dir, output_dir) =
        tokio::join!(files.dir_stats(Root::Upload), files.dir_stats(Root::Output));

    Json(StatsResponse {
        tasks: state.orchestrator.registry().counts().into(),
        upload_dir: upload_dir.into(),
        output_dir: output_dir.into(),
        cleanup_enabled: state.config.enable_cleanup,
        cleanup_interval_minutes: state.config.cleanup_interval_minutes,
        file_expire_hours: state.config.file_expire_hours,
        service_running: state.retention.is_running(),
    })
}

/// Delete expired files now and report what was removed.
///
/// Waits for any sweep already in progress before running its own.
#[utoipa::path(
    post,
    path = "/cleanup",
    tag = "admin",
    responses(
        (status = 200, description = "Sweep finished", body = CleanupResponse),
        (status = 401, description = "Missing or invalid API key"),
    )
)]
pub async fn manual_cleanup(State(state): State<Arc<AppState>>) -> Json<CleanupResponse> {
    info!("manual cleanup requested");
    Json(state.retention.sweep().await.into())
}
