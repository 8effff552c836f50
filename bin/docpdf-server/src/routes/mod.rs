//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional OpenAPI document (disable with `DOCPDF_ENABLE_DOCS=false`)
//! - Unauthenticated health routes
//! - Conversion, task, download and admin routes behind the bearer check

mod admin;
mod convert;
pub mod doc;
mod files;
mod health;
mod tasks;


use axum::routing::get;
use axum::{middleware, Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::middleware::{auth, cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(convert::router(&state.config))
        .merge(tasks::router())
        .merge(files::router())
        .merge(admin::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let mut app = Router::new().merge(health::router()).merge(protected);

    if state.config.enable_docs {
        let api_doc = doc::get_docs();
        app = app.route(
            "/api-docs/openapi.json",
            get(move || {
                let api_doc = api_doc.clone();
                async move { Json(api_doc) }
            }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
