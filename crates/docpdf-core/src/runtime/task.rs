use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Opaque task identifier (a UUID v4 in its hyphenated form).
pub type TaskId = String;

/// Lifecycle of an asynchronous conversion.
///
/// The only legal moves are `Pending → Processing → {Completed, Failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a task in `self` may be moved to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

/// Snapshot of one asynchronous conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    /// Logical name of the produced PDF; `Some` only when `Completed`.
    pub output_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionTask {
    pub(crate) fn pending(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            message: "Conversion task queued".to_owned(),
            output_filename: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn only_forward_transitions_are_legal() {
        use TaskStatus::*;
        let legal = [(Pending, Processing), (Processing, Completed), (Processing, Failed)];
        for from in TaskStatus::iter() {
            for to in TaskStatus::iter() {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for from in TaskStatus::iter().filter(|s| s.is_terminal()) {
            assert!(TaskStatus::iter().all(|to| !from.can_transition_to(to)));
        }
    }

    #[test]
    fn status_renders_lowercase() {
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert_eq!(TaskStatus::Completed.as_ref(), "completed");
    }
}
