use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;

/// Require `Authorization: Bearer <DOCPDF_API_KEY>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == state.config.api_key => next.run(req).await,
        _ => {
            debug!(path = %req.uri().path(), "rejected request without valid API key");
            ServerError::Unauthorized.into_response()
        }
    }
}
