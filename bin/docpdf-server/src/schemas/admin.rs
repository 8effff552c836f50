use chrono::{DateTime, Utc};
use docpdf_core::{DirStats, SweepReport, TaskCounts};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskCountsResponse {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl From<TaskCounts> for TaskCountsResponse {
    fn from(c: TaskCounts) -> Self {
        Self {
            pending: c.pending,
            processing: c.processing,
            completed: c.completed,
            failed: c.failed,
            total: c.total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DirStatsResponse {
    pub exists: bool,
    pub file_count: u64,
    /// Bytes.
    pub total_size: u64,
    pub total_size_mb: f64,
}

impl From<DirStats> for DirStatsResponse {
    fn from(s: DirStats) -> Self {
        Self {
            exists: s.exists,
            file_count: s.file_count,
            total_size: s.total_size,
            total_size_mb: s.total_size_mb,
        }
    }
}

/// Body of `GET /stats`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub tasks: TaskCountsResponse,
    pub upload_dir: DirStatsResponse,
    pub output_dir: DirStatsResponse,
    pub cleanup_enabled: bool,
    pub cleanup_interval_minutes: u64,
    pub file_expire_hours: u64,
    /// Whether the periodic sweep loop is running.
    pub service_running: bool,
}

/// Body of `POST /cleanup`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub timestamp: DateTime<Utc>,
    pub deleted_uploads: usize,
    pub deleted_outputs: usize,
    pub total_deleted: usize,
    pub upload_files: Vec<String>,
    pub output_files: Vec<String>,
    pub failed: Vec<String>,
}

impl From<SweepReport> for CleanupResponse {
    fn from(r: SweepReport) -> Self {
        Self {
            timestamp: r.timestamp,
            deleted_uploads: r.deleted_uploads,
            deleted_outputs: r.deleted_outputs,
            total_deleted: r.total_deleted,
            upload_files: r.upload_files,
            output_files: r.output_files,
            failed: r.failed,
        }
    }
}
