//! The pending-task FIFO with its dedup guard and handle registry.
//!
//! [`TaskQueue`] is meant to live on the coordinator thread (usually inside a
//! [`Coordinator`](crate::coordinator::Coordinator)). It binds itself to the
//! first thread that mutates it and panics if another thread mutates it later.

pub mod equivalence;
pub mod registry;

pub use equivalence::EquivalenceSet;
pub use registry::{TaskEntry, TaskRegistry};

use crate::model::{PendingTask, TaskId, TaskState};
use crate::task::Task;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, info};

/// Ordered buffer of pending tasks.
pub struct TaskQueue {
    pending: VecDeque<Arc<TaskEntry>>,
    equivalences: EquivalenceSet,
    registry: Arc<TaskRegistry>,
    owner: Option<ThreadId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new()))
    }

    /// Create a queue that registers handles in a registry shared with other
    /// threads (so they can cancel without hopping to the coordinator).
    pub fn with_registry(registry: Arc<TaskRegistry>) -> Self {
        Self {
            pending: VecDeque::with_capacity(5),
            equivalences: EquivalenceSet::new(),
            registry,
            owner: None,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Offer a task. Returns `false` (and disposes the task) if an equivalent
    /// task is already queued.
    pub fn enqueue<T: Task>(&mut self, task: T) -> bool {
        self.submit(Arc::new(task)).is_some()
    }

    /// Like [`enqueue`](Self::enqueue), but hands back the assigned ID so the
    /// caller can cancel the task later.
    pub fn submit(&mut self, task: Arc<dyn Task>) -> Option<TaskId> {
        self.assert_owner();

        let key = task.equivalence_key();
        if !self.equivalences.insert(key.clone()) {
            debug!(
                kind = task.kind(),
                %key,
                state = %TaskState::Rejected,
                "duplicate task rejected"
            );
            metrics::tasks_enqueued().add(1, &[KeyValue::new("result", "duplicate")]);
            task.dispose();
            return None;
        }

        let id = TaskId::new();
        let entry = Arc::new(TaskEntry::new(id, key, task));
        entry.advance(TaskState::Queued);
        self.registry.register(Arc::clone(&entry));
        debug!(
            task_id = %id,
            kind = entry.kind(),
            key = %entry.key(),
            state = %TaskState::Queued,
            "task queued"
        );
        metrics::tasks_enqueued().add(1, &[KeyValue::new("result", "accepted")]);
        self.pending.push_back(entry);
        Some(id)
    }

    /// Pop the first task that has not been cancelled. Cancelled tasks popped
    /// on the way are disposed without running. `None` when the FIFO is empty.
    pub fn poll_next(&mut self) -> Option<Arc<TaskEntry>> {
        self.assert_owner();

        while let Some(entry) = self.pending.pop_front() {
            self.equivalences.remove(entry.key());

            if entry.progress().is_cancelled() || entry.is_disposed() {
                debug!(
                    task_id = %entry.id(),
                    kind = entry.kind(),
                    state = %TaskState::Skipped,
                    "skipping cancelled task"
                );
                entry.advance(TaskState::Skipped);
                metrics::tasks_skipped().add(1, &[]);
                self.registry.dispose(&entry);
                continue;
            }

            return Some(entry);
        }
        None
    }

    /// Cancel a queued or running task. No-op if it already finished.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.registry.cancel(id)
    }

    /// Cancel every registered task, queued and running.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Drop every queued task without running it. Handles of tasks that were
    /// already dequeued are left alone, and so are the registry entries of
    /// the dropped tasks: `dispose_all_pending` still reaches them.
    pub fn clear(&mut self) {
        self.assert_owner();
        let dropped = self.pending.len();
        for entry in self.pending.drain(..) {
            entry.advance(TaskState::Discarded);
        }
        self.equivalences.clear();
        debug!(dropped, state = %TaskState::Discarded, "task queue cleared");
    }

    /// Cancel and dispose every task that still has a registered handle.
    /// Used at shutdown.
    pub fn dispose_all_pending(&mut self) -> usize {
        self.assert_owner();
        self.dispose_registered()
    }

    fn dispose_registered(&self) -> usize {
        let mut disposed = 0;
        for entry in self.registry.entries() {
            entry.progress().cancel();
            if self.registry.dispose(&entry) {
                disposed += 1;
            }
        }
        if disposed > 0 {
            info!(disposed, "disposed pending tasks");
        }
        disposed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Snapshot of queued tasks in execution order.
    pub fn pending(&self) -> Vec<PendingTask> {
        self.pending
            .iter()
            .map(|entry| PendingTask {
                id: entry.id(),
                kind: entry.kind().to_string(),
                key: entry.key().clone(),
                cancelled: entry.progress().is_cancelled(),
                enqueued_at: entry.enqueued_at(),
            })
            .collect()
    }

    fn assert_owner(&mut self) {
        let current = std::thread::current().id();
        match self.owner {
            None => self.owner = Some(current),
            Some(owner) => assert_eq!(
                owner, current,
                "TaskQueue mutated off its coordinator thread"
            ),
        }
    }
}

/// Dropping the queue is a forced teardown: whatever is still registered is
/// cancelled and disposed. This also runs when the last handle to the
/// coordinator goes away without a `shutdown`, on whichever thread drops it.
impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.dispose_registered();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
