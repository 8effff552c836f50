use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn, Instrument};

use crate::converter::Converter;
use crate::error::ConversionError;
use crate::runtime::admission::{Admission, ConversionPool};
use crate::runtime::registry::TaskRegistry;
use crate::runtime::task::{TaskId, TaskStatus};
use crate::storage::{validate_upload, FileStore, StoredUpload};

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-conversion engine time budget.
    pub timeout: Duration,
    /// Engine processes allowed to run at once.
    pub max_concurrent: usize,
    /// Accepted conversions allowed to wait for a free engine slot.
    pub queue_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_concurrent: 4,
            queue_capacity: 16,
        }
    }
}

/// Runs conversions for accepted uploads, synchronously or as tracked tasks.
///
/// Both entry points share [`Self::run_conversion`]; they differ only in who
/// waits for it. Cloning is cheap and every clone drives the same registry,
/// store and pool.
#[derive(Clone)]
pub struct Orchestrator {
    converter: Arc<dyn Converter>,
    registry: TaskRegistry,
    files: FileStore,
    pool: ConversionPool,
    timeout: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("files", &self.files)
            .field("pool", &self.pool)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        converter: Arc<dyn Converter>,
        registry: TaskRegistry,
        files: FileStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            converter,
            registry,
            files,
            pool: ConversionPool::new(config.max_concurrent, config.queue_capacity),
            timeout: config.timeout,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn pool(&self) -> &ConversionPool {
        &self.pool
    }

    /// Convert an upload and wait for the result.
    ///
    /// Returns the logical name of the produced PDF.
    pub async fn convert_sync(
        &self,
        original_name: &str,
        content: &[u8],
    ) -> Result<String, ConversionError> {
        let admission = self.admit(original_name, content)?;
        let upload = self.files.store_upload(original_name, content).await?;
        let _running = admission.start().await?;
        self.run_conversion(&upload).await
    }

    /// Accept an upload, register a `Pending` task and convert in the
    /// background.
    ///
    /// The task is in the registry before the background work is spawned, so
    /// a status query with the returned id can never miss it.
    pub async fn submit_async(
        &self,
        original_name: &str,
        content: &[u8],
    ) -> Result<TaskId, ConversionError> {
        let admission = self.admit(original_name, content)?;
        let upload = self.files.store_upload(original_name, content).await?;
        let task_id = self.registry.create();
        info!(task_id = %task_id, storage_name = %upload.storage_name, "conversion task accepted");

        let this = self.clone();
        let span = tracing::info_span!("conversion_task", task_id = %task_id);
        let id = task_id.clone();
        tokio::spawn(async move { this.process_task(id, upload, admission).await }.instrument(span));

        Ok(task_id)
    }

    /// Core procedure shared by both entry points: run the engine in a private
    /// staging directory and move the PDF into the output root.
    pub async fn run_conversion(&self, upload: &StoredUpload) -> Result<String, ConversionError> {
        let staging = self.files.staging_dir()?;
        let produced = self
            .converter
            .convert(&upload.path, staging.path(), self.timeout)
            .await?;
        let name = self.files.promote_output(&produced).await?;
        info!(
            original_name = %upload.original_name,
            output = %name,
            "conversion completed"
        );
        Ok(name)
    }

    /// Fail fast on bad input or a full queue before anything is written.
    fn admit(&self, original_name: &str, content: &[u8]) -> Result<Admission, ConversionError> {
        validate_upload(original_name, content)?;
        self.pool.try_admit().inspect_err(|_| {
            warn!(
                in_flight = self.pool.in_flight(),
                capacity = self.pool.capacity(),
                "conversion rejected: queue full"
            );
        })
    }

    async fn process_task(&self, task_id: TaskId, upload: StoredUpload, admission: Admission) {
        let outcome = match admission.start().await {
            Ok(running) => {
                self.record(&task_id, TaskStatus::Processing, "Conversion in progress", None);
                // Run on its own task so a panic in the engine adapter still
                // ends with a Failed record instead of a task stuck Processing.
                let this = self.clone();
                let result = tokio::spawn(async move {
                    let _running = running;
                    this.run_conversion(&upload).await
                })
                .await;
                result.unwrap_or_else(|e| {
                    error!(error = %e, "conversion worker aborted");
                    Err(ConversionError::failed("conversion worker aborted"))
                })
            }
            Err(e) => {
                self.record(&task_id, TaskStatus::Processing, "Conversion in progress", None);
                Err(e)
            }
        };

        match outcome {
            Ok(name) => self.record(
                &task_id,
                TaskStatus::Completed,
                "Conversion completed successfully",
                Some(name),
            ),
            Err(e) => {
                warn!(error = %e, "conversion task failed");
                self.record(&task_id, TaskStatus::Failed, e.to_string(), None)
            }
        }
    }

    fn record(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: impl Into<String>,
        output_filename: Option<String>,
    ) {
        if let Err(e) = self.registry.update(task_id, status, message, output_filename) {
            error!(task_id, error = %e, "failed to record task status");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::converter::fake::FakeConverter;
    use crate::storage::Root;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    struct Harness {
        _dir: TempDir,
        orchestrator: Orchestrator,
        engine: FakeConverter,
    }

    async fn harness(engine: FakeConverter, config: OrchestratorConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let files = FileStore::new(dir.path().join("uploads"), dir.path().join("outputs"));
        files.ensure_dirs().await.unwrap();
        let orchestrator =
            Orchestrator::new(Arc::new(engine.clone()), TaskRegistry::new(), files, config);
        Harness {
            _dir: dir,
            orchestrator,
            engine,
        }
    }

    async fn wait_terminal(orchestrator: &Orchestrator, id: &str) -> crate::ConversionTask {
        for _ in 0..200 {
            let task = orchestrator.registry().get(id).unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn sync_conversion_for_every_supported_format() {
        let h = harness(FakeConverter::new(), OrchestratorConfig::default()).await;
        for ext in ["doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp"] {
            let name = h
                .orchestrator
                .convert_sync(&format!("sample.{ext}"), b"minimal document")
                .await
                .unwrap_or_else(|e| panic!("{ext}: {e}"));
            assert!(name.starts_with("sample_") && name.ends_with(".pdf"), "{name}");
            let file = h.orchestrator.files().resolve(&name, Root::Output).await.unwrap();
            assert!(file.size > 0);
        }
        assert_eq!(h.engine.calls(), 9);
    }

    #[tokio::test]
    async fn invalid_uploads_never_reach_the_engine() {
        let h = harness(FakeConverter::new(), OrchestratorConfig::default()).await;
        let o = &h.orchestrator;

        for name in ["payload.exe", "notes.txt", "noextension"] {
            assert!(matches!(
                o.convert_sync(name, b"data").await,
                Err(ConversionError::UnsupportedFormat { .. })
            ));
            assert!(matches!(
                o.submit_async(name, b"data").await,
                Err(ConversionError::UnsupportedFormat { .. })
            ));
        }
        assert!(matches!(o.convert_sync("a.docx", b"").await, Err(ConversionError::EmptyFile)));
        assert!(matches!(o.submit_async("a.docx", b"").await, Err(ConversionError::EmptyFile)));

        assert_eq!(h.engine.calls(), 0);
        assert!(o.registry().is_empty(), "rejected uploads create no task");
        assert_eq!(o.files().dir_stats(Root::Upload).await.file_count, 0);
    }

    #[tokio::test]
    async fn async_task_is_visible_immediately() {
        let engine = FakeConverter::new().with_delay(Duration::from_millis(200));
        let h = harness(engine, OrchestratorConfig::default()).await;

        let id = h.orchestrator.submit_async("deck.pptx", b"slides").await.unwrap();
        let task = h.orchestrator.registry().get(&id).expect("task must exist");
        assert!(matches!(task.status, TaskStatus::Pending | TaskStatus::Processing));

        let done = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(done.status, TaskStatus::Completed);
        let name = done.output_filename.expect("completed task names its output");
        assert!(name.starts_with("deck_"));
        assert!(h.orchestrator.files().resolve(&name, Root::Output).await.is_ok());

        // Terminal state is stable.
        for _ in 0..5 {
            assert_eq!(h.orchestrator.registry().get(&id).unwrap().status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn engine_failure_is_recorded_on_the_task() {
        let h = harness(FakeConverter::failing("source file could not be loaded"), OrchestratorConfig::default()).await;
        let id = h.orchestrator.submit_async("broken.doc", b"garbage").await.unwrap();
        let task = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.message.contains("could not be loaded"), "{}", task.message);
        assert!(task.output_filename.is_none());
        assert!(logs_contain("conversion task failed"));
    }

    #[tokio::test]
    async fn timeout_becomes_failed_task() {
        let config = OrchestratorConfig {
            timeout: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        };
        let h = harness(FakeConverter::hanging(), config).await;
        let id = h.orchestrator.submit_async("slow.xlsx", b"cells").await.unwrap();
        let task = wait_terminal(&h.orchestrator, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.message.contains("timeout"), "{}", task.message);
    }

    #[tokio::test]
    async fn sync_path_surfaces_engine_errors() {
        let h = harness(FakeConverter::missing_engine(), OrchestratorConfig::default()).await;
        let err = h.orchestrator.convert_sync("a.odt", b"text").await.unwrap_err();
        assert!(matches!(err, ConversionError::EngineNotFound { .. }));
        assert!(h.orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn identical_names_converted_concurrently_do_not_collide() {
        let engine = FakeConverter::new().with_delay(Duration::from_millis(50));
        let h = harness(engine, OrchestratorConfig::default()).await;
        let o = h.orchestrator.clone();

        let (a, b) = tokio::join!(
            o.convert_sync("report.docx", b"alpha"),
            o.convert_sync("report.docx", b"bravo"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        let read = |name: &str| std::fs::read(o.files().root(Root::Output).join(name)).unwrap();
        assert!(read(&a).ends_with(b"alpha"));
        assert!(read(&b).ends_with(b"bravo"));
    }

    #[tokio::test]
    async fn full_queue_is_rejected_with_busy() {
        let engine = FakeConverter::new().with_delay(Duration::from_millis(300));
        let config = OrchestratorConfig {
            max_concurrent: 1,
            queue_capacity: 1,
            ..OrchestratorConfig::default()
        };
        let h = harness(engine, config).await;
        let o = &h.orchestrator;

        let first = o.submit_async("a.docx", b"1").await.unwrap();
        let second = o.submit_async("b.docx", b"2").await.unwrap();
        let err = o.submit_async("c.docx", b"3").await.unwrap_err();
        assert!(matches!(err, ConversionError::Busy { capacity: 2 }));
        assert_eq!(o.registry().len(), 2, "rejected submission creates no task");

        assert_eq!(wait_terminal(o, &first).await.status, TaskStatus::Completed);
        assert_eq!(wait_terminal(o, &second).await.status, TaskStatus::Completed);
        assert!(o.submit_async("d.docx", b"4").await.is_ok(), "capacity recovers");
    }

    #[tokio::test]
    async fn staging_directories_are_cleaned_up() {
        let h = harness(FakeConverter::new(), OrchestratorConfig::default()).await;
        h.orchestrator.convert_sync("x.ods", b"sheet").await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(h.orchestrator.files().root(Root::Output))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .collect();
        assert!(leftovers.is_empty());
    }
}
