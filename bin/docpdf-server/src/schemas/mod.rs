//! Request and response bodies for the HTTP API.

pub mod admin;
pub mod convert;
pub mod task;

/// Download URL for a produced PDF.
pub fn download_url(filename: &str) -> String {
    format!("/download/{filename}")
}
