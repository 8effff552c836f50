//! Server configuration, loaded from environment variables at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use docpdf_core::{OrchestratorConfig, RetentionConfig};

/// Runtime configuration for docpdf-server.
///
/// Every field has a default so the server starts without any environment
/// variables set. Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// Bearer token required on every business route.
    pub api_key: String,

    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,

    /// Run the periodic retention sweep.
    pub enable_cleanup: bool,
    pub cleanup_interval_minutes: u64,
    pub file_expire_hours: u64,

    /// Conversion engine executable, looked up on `PATH` when bare.
    pub soffice_path: PathBuf,

    /// Seconds before a running conversion is killed.
    pub conversion_timeout: u64,

    /// Engine processes allowed to run at once.
    pub max_concurrent: usize,

    /// Accepted conversions allowed to wait for a free engine slot.
    pub queue_capacity: usize,

    /// Request body limit for uploads, in MiB.
    pub max_upload_size_mb: usize,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS allow-list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_docs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_owned(),
            api_key: "your-api-key-here".to_owned(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            enable_cleanup: true,
            cleanup_interval_minutes: 30,
            file_expire_hours: 1,
            soffice_path: PathBuf::from("soffice"),
            conversion_timeout: 300,
            max_concurrent: 4,
            queue_capacity: 16,
            max_upload_size_mb: 100,
            log_level: "info".to_owned(),
            log_json: false,
            cors_allowed_origins: None,
            enable_docs: true,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_address: env_or("DOCPDF_BIND", &d.bind_address),
            api_key: env_or("DOCPDF_API_KEY", &d.api_key),
            upload_dir: parse_env("DOCPDF_UPLOAD_DIR", d.upload_dir),
            output_dir: parse_env("DOCPDF_OUTPUT_DIR", d.output_dir),
            enable_cleanup: bool_env("DOCPDF_ENABLE_CLEANUP", d.enable_cleanup),
            cleanup_interval_minutes: parse_env(
                "DOCPDF_CLEANUP_INTERVAL_MINUTES",
                d.cleanup_interval_minutes,
            ),
            file_expire_hours: parse_env("DOCPDF_FILE_EXPIRE_HOURS", d.file_expire_hours),
            soffice_path: parse_env("DOCPDF_SOFFICE_PATH", d.soffice_path),
            conversion_timeout: parse_env("DOCPDF_CONVERSION_TIMEOUT", d.conversion_timeout),
            max_concurrent: parse_env("DOCPDF_MAX_CONCURRENT", d.max_concurrent),
            queue_capacity: parse_env("DOCPDF_QUEUE_CAPACITY", d.queue_capacity),
            max_upload_size_mb: parse_env("DOCPDF_MAX_UPLOAD_SIZE_MB", d.max_upload_size_mb),
            log_level: env_or("DOCPDF_LOG", &d.log_level),
            log_json: bool_env("DOCPDF_LOG_JSON", d.log_json),
            cors_allowed_origins: std::env::var("DOCPDF_CORS_ORIGINS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            enable_docs: bool_env("DOCPDF_ENABLE_DOCS", d.enable_docs),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let addr = self.socket_addr()?;
        if addr.port() == 0 {
            bail!("DOCPDF_BIND must use a non-zero port, got '{}'", self.bind_address);
        }
        if self.cleanup_interval_minutes == 0 {
            bail!("DOCPDF_CLEANUP_INTERVAL_MINUTES must be greater than zero");
        }
        if self.file_expire_hours == 0 {
            bail!("DOCPDF_FILE_EXPIRE_HOURS must be greater than zero");
        }
        if self.conversion_timeout == 0 {
            bail!("DOCPDF_CONVERSION_TIMEOUT must be greater than zero");
        }
        if self.max_concurrent == 0 {
            bail!("DOCPDF_MAX_CONCURRENT must be greater than zero");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("DOCPDF_BIND '{}' is not a socket address", self.bind_address))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            timeout: Duration::from_secs(self.conversion_timeout),
            max_concurrent: self.max_concurrent,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            enabled: self.enable_cleanup,
            interval: Duration::from_secs(self.cleanup_interval_minutes * 60),
            expiry: Duration::from_secs(self.file_expire_hours * 3600),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_bool(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
