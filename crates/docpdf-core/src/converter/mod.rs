//! Boundary to the external document-rendering engine.
//!
//! The engine is a black box: it takes one input document and writes one PDF
//! into an output directory. [`Converter`] is the capability the rest of the
//! core depends on; [`SofficeConverter`] is the production implementation and
//! `FakeConverter` (feature `test-util`) stands in for it in tests.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
mod soffice;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ConversionError;

pub use soffice::SofficeConverter;

/// Extension of every file the engine produces.
pub const PDF_EXTENSION: &str = "pdf";

/// Office formats accepted for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DocumentFormat {
    Doc,
    Docx,
    Xls,
    Xlsx,
    Ppt,
    Pptx,
    Odt,
    Ods,
    Odp,
}

impl DocumentFormat {
    /// Detect the format from a file name or path by its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConversionError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_str(extension).map_err(|_| ConversionError::UnsupportedFormat {
            extension: if extension.is_empty() {
                "(none)".to_owned()
            } else {
                format!(".{}", extension.to_ascii_lowercase())
            },
        })
    }

    /// Canonical extension including the leading dot, e.g. `".docx"`.
    pub fn dotted(self) -> String {
        format!(".{self}")
    }

    /// `".doc, .docx, ..."` for error messages.
    pub fn supported_list() -> String {
        Self::iter().map(Self::dotted).collect::<Vec<_>>().join(", ")
    }
}

/// Name of the PDF the engine writes for `input`: same stem, `.pdf` extension.
pub fn output_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{stem}.{PDF_EXTENSION}")
}

/// Where the engine is expected to leave the PDF for `input`.
pub fn expected_output(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(output_file_name(input))
}

/// One-shot conversion of a document into a PDF.
///
/// Implementations must not share `output_dir` between concurrent calls;
/// callers hand each invocation its own directory. Concurrency limits are the
/// caller's business.
#[async_trait]
pub trait Converter: Send + Sync + 'static {
    /// Convert `input` into `output_dir`, giving up after `timeout`.
    ///
    /// Returns the path of the produced PDF.
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, ConversionError>;
}
