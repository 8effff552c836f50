//! Core of the docpdf service: the conversion engine boundary, the in-memory
//! task registry, the conversion orchestrator, the on-disk file store and the
//! retention scheduler.
//!
//! The HTTP surface lives in `docpdf-server`; nothing in this crate knows
//! about requests or responses.

pub mod converter;
pub mod error;
pub mod retention;
pub mod runtime;
pub mod storage;

pub use converter::{Converter, DocumentFormat, SofficeConverter};
pub use error::ConversionError;
pub use retention::{RetentionConfig, RetentionScheduler, SweepReport};
pub use runtime::orchestrator::{Orchestrator, OrchestratorConfig};
pub use runtime::registry::{TaskCounts, TaskRegistry};
pub use runtime::task::{ConversionTask, TaskId, TaskStatus};
pub use storage::{DirStats, FileStore, Root, StoredFile, StoredUpload};

#[cfg(any(test, feature = "test-util"))]
pub use converter::fake::FakeConverter;
