//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use docpdf_core::{Orchestrator, RetentionScheduler};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Accepts uploads, runs conversions and owns the task registry.
    pub orchestrator: Orchestrator,
    /// Periodic and manual expiry sweeps.
    pub retention: Arc<RetentionScheduler>,
}
