//! Registry of live tasks and their progress handles.
//!
//! Covers both queued and executing tasks. Unlike the FIFO it is shared with
//! every thread: cancellation comes from anywhere, and the worker removes
//! entries when it disposes them.

use crate::model::{EquivalenceKey, TaskId, TaskState};
use crate::progress::ProgressHandle;
use crate::task::Task;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A task accepted by the queue, together with its progress handle.
pub struct TaskEntry {
    id: TaskId,
    key: EquivalenceKey,
    task: Arc<dyn Task>,
    progress: ProgressHandle,
    enqueued_at: DateTime<Utc>,
    state: Mutex<TaskState>,
    disposed: AtomicBool,
}

impl TaskEntry {
    pub(crate) fn new(id: TaskId, key: EquivalenceKey, task: Arc<dyn Task>) -> Self {
        Self {
            id,
            key,
            task,
            progress: ProgressHandle::new(),
            enqueued_at: Utc::now(),
            state: Mutex::new(TaskState::Created),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &EquivalenceKey {
        &self.key
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    pub fn kind(&self) -> &str {
        self.task.kind()
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `to`, returning the previous state. Debug builds reject moves
    /// the lifecycle does not allow.
    pub(crate) fn advance(&self, to: TaskState) -> TaskState {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = *state;
        debug_assert!(
            from.can_transition_to(to),
            "task {} cannot move from {from} to {to}",
            self.id
        );
        *state = to;
        from
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("key", &self.key)
            .field("state", &self.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Concurrent map from task ID to live entry.
#[derive(Default)]
pub struct TaskRegistry {
    entries: DashMap<TaskId, Arc<TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, entry: Arc<TaskEntry>) {
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<TaskEntry>> {
        self.entries.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn progress(&self, id: TaskId) -> Option<ProgressHandle> {
        self.entries.get(&id).map(|e| e.progress.clone())
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancel a queued or running task. A task that already finished has no
    /// entry any more; that is not an error. Returns whether a handle was found.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.progress(id) {
            Some(progress) => {
                info!(task_id = %id, "cancel task");
                progress.cancel();
                true
            }
            None => {
                debug!(task_id = %id, "cancel ignored, task already finished");
                false
            }
        }
    }

    /// Cancel every registered task. Returns how many handles were cancelled.
    pub fn cancel_all(&self) -> usize {
        let handles = self.handles();
        for progress in &handles {
            progress.cancel();
        }
        handles.len()
    }

    /// Dispose an entry: remove it from the registry, then run the task's
    /// dispose hook. Safe to call more than once; only the first call has any
    /// effect. Returns whether this call did the disposal.
    pub fn dispose(&self, entry: &TaskEntry) -> bool {
        if entry.disposed.swap(true, Ordering::SeqCst) {
            debug!(task_id = %entry.id, "already disposed");
            return false;
        }
        self.entries.remove(&entry.id);
        entry.task.dispose();
        debug!(task_id = %entry.id, kind = entry.kind(), "task disposed");
        true
    }

    /// Snapshot of all live entries.
    pub fn entries(&self) -> Vec<Arc<TaskEntry>> {
        // Collect before acting on them: holding a shard guard while calling
        // back into the map would deadlock.
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn handles(&self) -> Vec<ProgressHandle> {
        self.entries.iter().map(|e| e.progress.clone()).collect()
    }
}
