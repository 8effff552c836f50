use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schemas::download_url;

/// Body of `POST /convert/sync` and `POST /convert/async`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ConversionResponse {
    pub fn converted(filename: String) -> Self {
        Self {
            success: true,
            message: "Conversion completed successfully".to_owned(),
            task_id: None,
            download_url: Some(download_url(&filename)),
            filename: Some(filename),
        }
    }

    pub fn accepted(task_id: String) -> Self {
        Self {
            success: true,
            message: "Conversion task started".to_owned(),
            task_id: Some(task_id),
            download_url: None,
            filename: None,
        }
    }
}

/// Multipart upload accepted by the conversion endpoints (OpenAPI only).
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct ConversionUpload {
    /// Office document (.doc, .docx, .xls, .xlsx, .ppt, .pptx, .odt, .ods, .odp).
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
