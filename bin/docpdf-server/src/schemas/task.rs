use chrono::{DateTime, Utc};
use docpdf_core::ConversionTask;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schemas::download_url;

/// Body of `GET /task/{task_id}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// One of `pending`, `processing`, `completed`, `failed`.
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversionTask> for TaskStatusResponse {
    fn from(task: ConversionTask) -> Self {
        Self {
            download_url: task.output_filename.as_deref().map(download_url),
            task_id: task.id,
            status: task.status.to_string(),
            message: task.message,
            filename: task.output_filename,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}
