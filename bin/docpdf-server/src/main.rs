//! docpdf-server – entry point.
//!
//! Startup order:
//! 1. Parse and validate configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Create the upload and output directories.
//! 4. Build the conversion orchestrator around the LibreOffice engine.
//! 5. Start the retention sweep loop (when enabled).
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.
//! 7. Stop the retention loop once the server has drained.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::sync::Arc;

use anyhow::Context;
use docpdf_core::{FileStore, Orchestrator, RetentionScheduler, SofficeConverter, TaskRegistry};
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();
    cfg.validate().context("invalid configuration")?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: DOCPDF_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "docpdf-server starting");

    // ── 3. Storage ─────────────────────────────────────────────────────────────
    let files = FileStore::new(&cfg.upload_dir, &cfg.output_dir);
    files
        .ensure_dirs()
        .await
        .context("failed to create upload/output directories")?;
    info!(
        upload_dir = %cfg.upload_dir.display(),
        output_dir = %cfg.output_dir.display(),
        "storage ready"
    );

    // ── 4. Conversion orchestrator ─────────────────────────────────────────────
    let converter = SofficeConverter::new(&cfg.soffice_path);
    let orchestrator = Orchestrator::new(
        Arc::new(converter),
        TaskRegistry::new(),
        files.clone(),
        cfg.orchestrator(),
    );
    info!(
        soffice = %cfg.soffice_path.display(),
        max_concurrent = cfg.max_concurrent,
        queue_capacity = cfg.queue_capacity,
        timeout_secs = cfg.conversion_timeout,
        "conversion orchestrator ready"
    );

    // ── 5. Retention loop ──────────────────────────────────────────────────────
    let retention = Arc::new(RetentionScheduler::new(files, cfg.retention()));
    retention.start();

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let addr = cfg.socket_addr()?;
    let state = Arc::new(AppState {
        config: Arc::new(cfg),
        orchestrator,
        retention: Arc::clone(&retention),
    });
    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // ── 7. Retention shutdown ──────────────────────────────────────────────────
    retention.stop().await;

    served?;
    info!("docpdf-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
