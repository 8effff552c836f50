use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConversionError;
use crate::runtime::task::{ConversionTask, TaskId, TaskStatus};

/// Thread-safe, in-memory store of asynchronous conversion tasks.
///
/// Backed by a sharded `DashMap`: writers to the same task id are serialised
/// by the shard lock, while tasks on other shards proceed independently. Each
/// update replaces the whole record under that lock, so a reader never sees a
/// `Completed` task whose `output_filename` is still unset.
///
/// Records live as long as the process; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<TaskId, ConversionTask>>,
}

/// Number of tasks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh `Pending` task and return its id.
    ///
    /// The record is visible to [`Self::get`] as soon as this returns.
    pub fn create(&self) -> TaskId {
        loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.tasks.entry(id.clone()) {
                slot.insert(ConversionTask::pending(id.clone()));
                debug!(task_id = %id, "task created");
                return id;
            }
        }
    }

    /// Move a task to `status` with a new `message`.
    ///
    /// `output_filename` is stored only for `Completed`; any other status
    /// clears it. Fails with `TaskNotFound` for an unknown id and with
    /// `InvalidTransition` when the move would go backwards, leaving the
    /// record untouched.
    pub fn update(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: impl Into<String>,
        output_filename: Option<String>,
    ) -> Result<ConversionTask, ConversionError> {
        let mut record = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ConversionError::TaskNotFound {
                task_id: task_id.to_owned(),
            })?;

        if !record.status.can_transition_to(status) {
            warn!(task_id, from = %record.status, to = %status, "rejected task transition");
            return Err(ConversionError::InvalidTransition {
                task_id: task_id.to_owned(),
                from: record.status,
                to: status,
            });
        }

        let next = ConversionTask {
            id: record.id.clone(),
            status,
            message: message.into(),
            output_filename: output_filename.filter(|_| status == TaskStatus::Completed),
            created_at: record.created_at,
            updated_at: Utc::now(),
        };
        *record = next.clone();
        debug!(task_id, status = %status, "task updated");
        Ok(next)
    }

    /// Snapshot of a task.
    pub fn get(&self, task_id: &str) -> Result<ConversionTask, ConversionError> {
        self.tasks
            .get(task_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ConversionError::TaskNotFound {
                task_id: task_id.to_owned(),
            })
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for task in self.tasks.iter() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn created_task_is_pending_and_visible() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        let task = registry.get(&id).expect("task should exist");
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.output_filename.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let registry = TaskRegistry::new();
        let ids: HashSet<_> = (0..1000).map(|_| registry.create()).collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(registry.len(), 1000);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(ConversionError::TaskNotFound { .. })
        ));
        assert!(matches!(
            registry.update("missing", TaskStatus::Processing, "x", None),
            Err(ConversionError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn full_lifecycle_sets_output_only_on_completion() {
        let registry = TaskRegistry::new();
        let id = registry.create();

        let processing = registry
            .update(&id, TaskStatus::Processing, "working", Some("early.pdf".into()))
            .unwrap();
        assert!(processing.output_filename.is_none());

        let done = registry
            .update(&id, TaskStatus::Completed, "done", Some("report_1.pdf".into()))
            .unwrap();
        assert_eq!(done.output_filename.as_deref(), Some("report_1.pdf"));
        assert!(done.updated_at >= done.created_at);
    }

    #[test]
    fn regressions_are_rejected_and_leave_record_intact() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        registry.update(&id, TaskStatus::Processing, "working", None).unwrap();
        registry
            .update(&id, TaskStatus::Completed, "done", Some("out.pdf".into()))
            .unwrap();

        for status in [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Failed] {
            let err = registry.update(&id, status, "late write", None).unwrap_err();
            assert!(matches!(err, ConversionError::InvalidTransition { .. }));
        }

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.message, "done");
        assert_eq!(task.output_filename.as_deref(), Some("out.pdf"));
    }

    #[test]
    fn pending_cannot_skip_processing() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        assert!(registry
            .update(&id, TaskStatus::Completed, "done", Some("x.pdf".into()))
            .is_err());
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn counts_by_status() {
        let registry = TaskRegistry::new();
        let a = registry.create();
        let b = registry.create();
        let _c = registry.create();
        registry.update(&a, TaskStatus::Processing, "", None).unwrap();
        registry.update(&b, TaskStatus::Processing, "", None).unwrap();
        registry.update(&b, TaskStatus::Failed, "boom", None).unwrap();

        let counts = registry.counts();
        assert_eq!(
            counts,
            TaskCounts {
                pending: 1,
                processing: 1,
                completed: 0,
                failed: 1,
                total: 3,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_half_written_completion() {
        let registry = TaskRegistry::new();
        let ids: Vec<_> = (0..64).map(|_| registry.create()).collect();

        let writer = {
            let registry = registry.clone();
            let ids = ids.clone();
            tokio::spawn(async move {
                for id in &ids {
                    registry.update(id, TaskStatus::Processing, "working", None).unwrap();
                    registry
                        .update(id, TaskStatus::Completed, "done", Some(format!("{id}.pdf")))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let reader = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    for id in &ids {
                        let task = registry.get(id).unwrap();
                        assert_eq!(
                            task.status == TaskStatus::Completed,
                            task.output_filename.is_some()
                        );
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(registry.counts().completed, 64);
    }
}
