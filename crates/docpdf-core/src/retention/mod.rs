//! Periodic deletion of expired uploads and outputs.
//!
//! A *sweep* walks the upload and output roots and removes every regular file
//! whose modification time is older than the configured expiry. Sweeps are
//! serialised by a lock, so the timer loop and a manual trigger never overlap;
//! a manual trigger that arrives mid-sweep waits, then runs its own pass.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::storage::{FileStore, Root};

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Whether the timer loop runs. Manual sweeps work either way.
    pub enabled: bool,
    /// Time between timer-driven sweeps.
    pub interval: Duration,
    /// Files older than this are deleted.
    pub expiry: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30 * 60),
            expiry: Duration::from_secs(60 * 60),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub timestamp: DateTime<Utc>,
    pub deleted_uploads: usize,
    pub deleted_outputs: usize,
    pub total_deleted: usize,
    pub upload_files: Vec<String>,
    pub output_files: Vec<String>,
    /// Expired files that could not be deleted.
    pub failed: Vec<String>,
}

/// Deleted and undeletable paths from one directory.
#[derive(Debug, Default)]
struct DirSweep {
    deleted: Vec<String>,
    failed: Vec<String>,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct RetentionScheduler {
    files: FileStore,
    config: RetentionConfig,
    sweep_lock: tokio::sync::Mutex<()>,
    running: AtomicBool,
    handle: Mutex<Option<LoopHandle>>,
}

impl std::fmt::Debug for RetentionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RetentionScheduler {
    pub fn new(files: FileStore, config: RetentionConfig) -> Self {
        Self {
            files,
            config,
            sweep_lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Whether the timer loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the timer loop. Returns `false` if disabled or already running.
    ///
    /// The first sweep runs immediately, then once per interval.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            info!("file cleanup is disabled");
            return false;
        }
        let Ok(mut handle) = self.handle.lock() else {
            error!("retention handle lock poisoned");
            return false;
        };
        if handle.is_some() {
            warn!("cleanup service is already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let join = tokio::spawn(async move { this.run_loop(shutdown_rx).await });
        *handle = Some(LoopHandle { shutdown, join });
        self.running.store(true, Ordering::SeqCst);
        info!(
            interval_minutes = self.config.interval.as_secs() / 60,
            expiry_hours = self.config.expiry.as_secs() / 3600,
            "file cleanup service started"
        );
        true
    }

    /// Stop the timer loop and wait for it to exit.
    ///
    /// An in-progress sweep is abandoned at its next await point rather than
    /// finished. Calling this when not running is a no-op.
    pub async fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                error!("retention handle lock poisoned");
                None
            }
        };
        let Some(LoopHandle { shutdown, join }) = handle else {
            return;
        };
        // The loop may already be gone; either way it is finished below.
        let _ = shutdown.send(true);
        if let Err(e) = join.await {
            warn!(error = %e, "cleanup loop ended abnormally");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("file cleanup service stopped");
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                report = self.sweep() => {
                    debug!(total_deleted = report.total_deleted, "scheduled sweep finished");
                }
            }
        }
        debug!("cleanup loop exiting");
    }

    /// Run one sweep now. Used by both the timer and manual triggers.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        info!("starting file cleanup");

        let uploads = self.sweep_dir(self.files.root(Root::Upload)).await;
        let outputs = self.sweep_dir(self.files.root(Root::Output)).await;

        let mut failed = uploads.failed;
        failed.extend(outputs.failed);
        let report = SweepReport {
            timestamp: Utc::now(),
            deleted_uploads: uploads.deleted.len(),
            deleted_outputs: outputs.deleted.len(),
            total_deleted: uploads.deleted.len() + outputs.deleted.len(),
            upload_files: uploads.deleted,
            output_files: outputs.deleted,
            failed,
        };
        info!(
            total_deleted = report.total_deleted,
            failed = report.failed.len(),
            "cleanup completed"
        );
        report
    }

    async fn sweep_dir(&self, dir: &Path) -> DirSweep {
        let expired = expired_files(dir, self.config.expiry, SystemTime::now()).await;
        delete_all(expired).await
    }
}

/// Regular files directly under `dir` whose mtime is more than `expiry`
/// before `now`. Unreadable entries are logged and skipped.
async fn expired_files(dir: &Path, expiry: Duration, now: SystemTime) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "error scanning directory");
            return Vec::new();
        }
    };

    let mut expired = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "error scanning directory");
                break;
            }
        };
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error checking file expiry");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        match meta.modified() {
            Ok(mtime) if is_expired(mtime, expiry, now) => expired.push(path),
            Ok(_) => {}
            Err(e) => error!(path = %path.display(), error = %e, "error checking file expiry"),
        }
    }
    expired
}

fn is_expired(mtime: SystemTime, expiry: Duration, now: SystemTime) -> bool {
    // An mtime in the future yields an error here and counts as fresh.
    now.duration_since(mtime).map(|age| age > expiry).unwrap_or(false)
}

/// Delete every path, recording failures without stopping.
async fn delete_all(paths: Vec<PathBuf>) -> DirSweep {
    let mut sweep = DirSweep::default();
    for path in paths {
        let shown = path.display().to_string();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %shown, "deleted expired file");
                sweep.deleted.push(shown);
            }
            Err(e) => {
                error!(path = %shown, error = %e, "error deleting file");
                sweep.failed.push(shown);
            }
        }
    }
    sweep
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    const HOUR: Duration = Duration::from_secs(3600);

    fn fixture() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let files = FileStore::new(dir.path().join("uploads"), dir.path().join("outputs"));
        std::fs::create_dir_all(files.root(Root::Upload)).unwrap();
        std::fs::create_dir_all(files.root(Root::Output)).unwrap();
        (dir, files)
    }

    fn write_aged(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"content").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn scheduler(files: FileStore, enabled: bool, interval: Duration) -> Arc<RetentionScheduler> {
        Arc::new(RetentionScheduler::new(
            files,
            RetentionConfig {
                enabled,
                interval,
                expiry: HOUR,
            },
        ))
    }

    #[test]
    fn expiry_is_strictly_older_than_threshold() {
        let now = SystemTime::now();
        assert!(is_expired(now - 2 * HOUR, HOUR, now));
        assert!(!is_expired(now - HOUR / 2, HOUR, now));
        assert!(!is_expired(now + HOUR, HOUR, now), "future mtime is fresh");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_files_in_both_roots() {
        let (_dir, files) = fixture();
        let old_upload = write_aged(files.root(Root::Upload), "old.docx", 2 * HOUR);
        let new_upload = write_aged(files.root(Root::Upload), "new.docx", HOUR / 4);
        let old_output = write_aged(files.root(Root::Output), "old.pdf", 3 * HOUR);
        let new_output = write_aged(files.root(Root::Output), "new.pdf", Duration::ZERO);

        let report = scheduler(files, true, HOUR).sweep().await;

        assert!(!old_upload.exists());
        assert!(!old_output.exists());
        assert!(new_upload.exists());
        assert!(new_output.exists());
        assert_eq!(report.deleted_uploads, 1);
        assert_eq!(report.deleted_outputs, 1);
        assert_eq!(report.total_deleted, 2);
        assert!(report.upload_files[0].ends_with("old.docx"));
        assert!(report.output_files[0].ends_with("old.pdf"));
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn sweep_skips_directories() {
        let (_dir, files) = fixture();
        let staging = files.root(Root::Output).join(".staging-1");
        std::fs::create_dir(&staging).unwrap();
        let report = scheduler(files, true, HOUR).sweep().await;
        assert!(staging.exists());
        assert_eq!(report.total_deleted, 0);
    }

    #[tokio::test]
    async fn missing_roots_yield_an_empty_report() {
        let files = FileStore::new("/nonexistent/uploads", "/nonexistent/outputs");
        let report = scheduler(files, true, HOUR).sweep().await;
        assert_eq!(report.total_deleted, 0);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn one_failed_deletion_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let first = write_aged(dir.path(), "a.pdf", 2 * HOUR);
        let vanished = dir.path().join("already-gone.pdf");
        let last = write_aged(dir.path(), "z.pdf", 2 * HOUR);

        let sweep = delete_all(vec![first.clone(), vanished, last.clone()]).await;

        assert_eq!(sweep.deleted.len(), 2);
        assert_eq!(sweep.failed.len(), 1);
        assert!(sweep.failed[0].ends_with("already-gone.pdf"));
        assert!(!first.exists());
        assert!(!last.exists());
        assert!(logs_contain("error deleting file"));
    }

    #[tokio::test]
    async fn disabled_scheduler_does_not_start() {
        let (_dir, files) = fixture();
        let scheduler = scheduler(files, false, HOUR);
        assert!(!scheduler.start());
        assert!(!scheduler.is_running());
        // Manual sweeps still work.
        assert_eq!(scheduler.sweep().await.total_deleted, 0);
    }

    #[tokio::test]
    async fn timer_sweeps_immediately_and_stops_cleanly() {
        let (_dir, files) = fixture();
        let old = write_aged(files.root(Root::Output), "old.pdf", 2 * HOUR);
        let scheduler = scheduler(files, true, HOUR);

        assert!(scheduler.start());
        assert!(!scheduler.start(), "second start is refused");
        assert!(scheduler.is_running());

        for _ in 0..100 {
            if !old.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!old.exists(), "first tick sweeps right away");

        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .expect("stop must not wait for the next tick");
        assert!(!scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn manual_and_timer_sweeps_never_overlap() {
        let (_dir, files) = fixture();
        let scheduler = scheduler(files, true, HOUR);

        // Hold the sweep lock as if a sweep were in progress.
        let guard = scheduler.sweep_lock.lock().await;
        let manual = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.sweep().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!manual.is_finished(), "manual sweep waits for the running one");

        drop(guard);
        let report = tokio::time::timeout(Duration::from_secs(1), manual)
            .await
            .expect("manual sweep runs once the lock frees")
            .unwrap();
        assert_eq!(report.total_deleted, 0);
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_a_blocked_sweep() {
        let (_dir, files) = fixture();
        let scheduler = scheduler(files, true, Duration::from_millis(10));

        let guard = scheduler.sweep_lock.lock().await;
        assert!(scheduler.start());
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .expect("stop abandons the in-progress sweep");
        drop(guard);
    }
}
