//! Error taxonomy shared by every component of the conversion core.
//!
//! Validation failures (`UnsupportedFormat`, `EmptyFile`, `InvalidName`) are
//! the caller's fault and are reported back verbatim. Engine failures
//! (`EngineNotFound`, `Timeout`, `ConversionFailed`) are either returned to a
//! synchronous caller or recorded on the task for later retrieval.

use std::path::PathBuf;

use thiserror::Error;

use crate::converter::DocumentFormat;
use crate::runtime::task::TaskStatus;

#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Input validation ─────────────────────────────────────────────────
    /// The upload's extension is not one the engine accepts.
    #[error(
        "Unsupported file type: '{extension}'. Supported types: {}",
        DocumentFormat::supported_list()
    )]
    UnsupportedFormat { extension: String },

    /// The upload has zero bytes.
    #[error("Empty file")]
    EmptyFile,

    /// A logical file name that could escape its root directory.
    #[error("Invalid file name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    // ── Engine ───────────────────────────────────────────────────────────
    /// The engine executable is missing or cannot be executed.
    #[error("Conversion engine not found at '{}'", program.display())]
    EngineNotFound { program: PathBuf },

    /// The engine exceeded its time budget and was killed.
    #[error("Conversion timeout after {secs} seconds")]
    Timeout { secs: u64 },

    /// The engine ran but reported an error or produced no PDF.
    #[error("Conversion failed: {reason}")]
    ConversionFailed { reason: String },

    // ── Registry / store lookups ─────────────────────────────────────────
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    /// A status write that would move a task backwards.
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("File {name} not found")]
    FileNotFound { name: String },

    // ── Capacity ─────────────────────────────────────────────────────────
    /// Every worker is busy and the waiting queue is full.
    #[error("Conversion queue is full ({capacity} conversions in flight); retry later")]
    Busy { capacity: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// `true` for errors caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConversionError::UnsupportedFormat { .. }
                | ConversionError::EmptyFile
                | ConversionError::InvalidName { .. }
        )
    }

    /// `true` for errors raised by (or around) the external engine.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            ConversionError::EngineNotFound { .. }
                | ConversionError::Timeout { .. }
                | ConversionError::ConversionFailed { .. }
        )
    }

    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        ConversionError::ConversionFailed {
            reason: reason.into(),
        }
    }
}
