//! In-process stand-in for the conversion engine.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{expected_output, Converter, DocumentFormat};
use crate::error::ConversionError;

/// Scripted outcome of every call to a [`FakeConverter`].
#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    MissingEngine,
    /// Sleeps past the caller's timeout.
    Hang,
}

/// A [`Converter`] that writes a tiny PDF (or fails on demand) without
/// spawning anything.
///
/// Clones share the call counter, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Debug, Clone)]
pub struct FakeConverter {
    behavior: Behavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeConverter {
    /// Succeeds immediately.
    pub fn new() -> Self {
        Self {
            behavior: Behavior::Succeed,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every conversion with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(reason.into()),
            ..Self::new()
        }
    }

    /// Behaves as if the engine binary were missing.
    pub fn missing_engine() -> Self {
        Self {
            behavior: Behavior::MissingEngine,
            ..Self::new()
        }
    }

    /// Never finishes on its own; the call ends with `Timeout`.
    pub fn hanging() -> Self {
        Self {
            behavior: Behavior::Hang,
            ..Self::new()
        }
    }

    /// Waits `delay` before producing the outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of conversions attempted so far (across clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, ConversionError> {
        DocumentFormat::from_path(input)?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = match self.behavior {
            Behavior::Hang => timeout,
            _ => self.delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Succeed => {
                let produced = expected_output(input, output_dir);
                let source = tokio::fs::read(input).await?;
                let mut pdf = b"%PDF-1.4\n%fake\n".to_vec();
                pdf.extend_from_slice(&source);
                tokio::fs::write(&produced, pdf).await?;
                Ok(produced)
            }
            Behavior::Fail(reason) => Err(ConversionError::failed(reason.clone())),
            Behavior::MissingEngine => Err(ConversionError::EngineNotFound {
                program: PathBuf::from("fake-soffice"),
            }),
            Behavior::Hang => Err(ConversionError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }
}
