//! PDF download.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use docpdf_core::{ConversionError, Root};
use tokio_util::io::ReaderStream;
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(download_file))]
pub struct FilesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download/{filename}", get(download_file))
}

/// Stream a converted PDF from the output root.
///
/// Names that could leave the output root are rejected with 400; names that
/// do not resolve to a regular file there yield 404.
#[utoipa::path(
    get,
    path = "/download/{filename}",
    tag = "files",
    params(
        ("filename" = String, Path, description = "Logical name from a conversion response")
    ),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Invalid file name"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "File not found"),
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    let file = state
        .orchestrator
        .files()
        .resolve(&filename, Root::Output)
        .await?;
    let pdf = tokio::fs::File::open(&file.path)
        .await
        .map_err(ConversionError::from)?;
    debug!(filename = %file.logical_name, size = file.size, "serving download");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.logical_name.replace('"', "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, file.size.to_string()),
        ],
        Body::from_stream(ReaderStream::new(pdf)),
    )
        .into_response())
}
