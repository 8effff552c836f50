//! Conversion endpoints: synchronous and task-based.
//!
//! Both accept a `multipart/form-data` body with a single `file` field. The
//! whole upload is read into memory (bounded by `DOCPDF_MAX_UPLOAD_SIZE_MB`)
//! before it is handed to the orchestrator, which validates it, reserves a
//! conversion slot and only then writes it to the upload root.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::config::Config;
use crate::error::ServerError;
use crate::schemas::convert::{ConversionResponse, ConversionUpload};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(convert_sync, convert_async),
    components(schemas(ConversionResponse, ConversionUpload))
)]
pub struct ConvertApi;

/// Register conversion routes with the configured upload size limit.
pub fn router(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/convert/sync", post(convert_sync))
        .route("/convert/async", post(convert_async))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
}

/// An uploaded document as received from the client.
#[derive(Debug)]
struct Upload {
    file_name: String,
    content: Bytes,
}

/// Convert a document and wait for the PDF.
#[utoipa::path(
    post,
    path = "/convert/sync",
    tag = "convert",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document converted", body = ConversionResponse),
        (status = 400, description = "Unsupported, empty or malformed upload"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 429, description = "Conversion queue is full"),
        (status = 500, description = "Conversion engine error"),
        (status = 504, description = "Conversion timed out"),
    )
)]
pub async fn convert_sync(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConversionResponse>, ServerError> {
    let upload = read_upload(multipart).await?;
    let filename = state
        .orchestrator
        .convert_sync(&upload.file_name, &upload.content)
        .await?;
    info!(original_name = %upload.file_name, output = %filename, "synchronous conversion finished");
    Ok(Json(ConversionResponse::converted(filename)))
}

/// Accept a document for background conversion and return its task id.
///
/// Poll `GET /task/{task_id}` for progress.
#[utoipa::path(
    post,
    path = "/convert/async",
    tag = "convert",
    request_body(content = ConversionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Task accepted", body = ConversionResponse),
        (status = 400, description = "Unsupported, empty or malformed upload"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 429, description = "Conversion queue is full"),
    )
)]
pub async fn convert_async(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConversionResponse>, ServerError> {
    let upload = read_upload(multipart).await?;
    let task_id = state
        .orchestrator
        .submit_async(&upload.file_name, &upload.content)
        .await?;
    Ok(Json(ConversionResponse::accepted(task_id)))
}

/// Pull the `file` field out of the multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServerError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("unknown").to_owned();
        if field_name != "file" {
            return Err(ServerError::BadRequest(format!("Unknown field: {field_name}")));
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let content = field.bytes().await.map_err(multipart_error)?;
        debug!(file_name = %file_name, size_bytes = content.len(), "received file upload");
        upload = Some(Upload { file_name, content });
    }
    upload.ok_or_else(|| ServerError::BadRequest("No file uploaded".into()))
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::BadRequest(format!("Failed to read multipart body: {}", e.body_text()))
    }
}
