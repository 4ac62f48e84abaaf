//! Core data model.
//!
//! Tasks are identified by a queue-assigned [`TaskId`] and deduplicated by an
//! [`EquivalenceKey`] they supply themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task ID
// ---------------------------------------------------------------------------

/// Newtype for task IDs. Assigned by the queue when a task is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Equivalence key
// ---------------------------------------------------------------------------

/// Dedup key. Two tasks with equal keys are duplicates while one of them is
/// still queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivalenceKey(Arc<str>);

impl EquivalenceKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// A key no other task will share. For work that must never be merged.
    pub fn identity(id: TaskId) -> Self {
        Self(Arc::from(format!("identity:{}", id.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EquivalenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EquivalenceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for EquivalenceKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Built by a producer, not yet offered to the queue.
    Created,
    /// Accepted and waiting in the FIFO.
    Queued,
    /// Dequeued and executing on the worker thread.
    Running,
    /// `run` returned normally.
    Completed,
    /// `run` unwound with the cancellation signal.
    Cancelled,
    /// `run` returned an error or panicked.
    Failed,
    /// Cancelled while queued; dropped at dequeue without running.
    Skipped,
    /// Removed from the FIFO by `clear` without running.
    Discarded,
    /// Duplicate of a queued task; disposed on enqueue.
    Rejected,
}

impl TaskState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Created, Queued)
                | (Created, Rejected)
                | (Queued, Running)
                | (Queued, Skipped)
                | (Queued, Discarded)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed
                | TaskState::Cancelled
                | TaskState::Failed
                | TaskState::Skipped
                | TaskState::Discarded
                | TaskState::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
            TaskState::Discarded => "discarded",
            TaskState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only view of a queued task, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PendingTask {
    pub id: TaskId,
    pub kind: String,
    pub key: EquivalenceKey,
    pub cancelled: bool,
    pub enqueued_at: DateTime<Utc>,
}
