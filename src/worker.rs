//! Worker loop: fetch the next task through the coordinator, run it, dispose it.
//!
//! ```text
//! Idle -> Fetching -> Running -> Idle -> ... -> Drained
//! ```
//!
//! Only one task runs at a time. A task that returns the cancellation signal
//! is a normal exit; any other error or a panic is logged once as a defect
//! and the loop moves on to the next task.

use crate::coordinator::{Coordinator, panic_message};
use crate::error::Result;
use crate::latch::{HeavyWorkLatch, LatchKind};
use crate::model::TaskState;
use crate::progress::ProgressHandle;
use crate::queue::{TaskEntry, TaskQueue, TaskRegistry};
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace};

/// Reason recorded on the heavy-work latch unless configured otherwise.
pub const DEFAULT_LATCH_REASON: &str = "Performing indexing tasks";

/// Where the worker loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Fetching,
    Running,
    Drained,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Fetching => "fetching",
            WorkerState::Running => "running",
            WorkerState::Drained => "drained",
        };
        write!(f, "{s}")
    }
}

/// Tally of one drain of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Tasks handed to the worker (whatever their outcome).
    pub executed: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl WorkerReport {
    fn record(&mut self, state: TaskState) {
        self.executed += 1;
        match state {
            TaskState::Completed => self.completed += 1,
            TaskState::Cancelled => self.cancelled += 1,
            _ => self.failed += 1,
        }
    }
}

/// Observes which kind of task is about to run.
pub trait ActivityReporter {
    fn stage_started(&self, kind: &str);
}

impl<F: Fn(&str)> ActivityReporter for F {
    fn stage_started(&self, kind: &str) {
        self(kind)
    }
}

/// Reporter that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActivity;

impl ActivityReporter for NoopActivity {
    fn stage_started(&self, _kind: &str) {}
}

/// Progress binder that runs tasks on the queue-assigned handle unchanged.
pub fn identity_binder(progress: ProgressHandle) -> ProgressHandle {
    progress
}

/// Drains a [`TaskQueue`] living on a coordinator thread.
pub struct WorkerLoop {
    queue: Coordinator<TaskQueue>,
    registry: Arc<TaskRegistry>,
    latch: &'static HeavyWorkLatch,
    latch_reason: String,
    state: WorkerState,
}

impl WorkerLoop {
    /// Worker for the queue owned by `queue`. Disposals go to that queue's
    /// own registry, fetched with one hop to the coordinator.
    pub fn new(queue: Coordinator<TaskQueue>) -> Result<Self> {
        let registry = queue.compute(|q| Arc::clone(q.registry()))?;
        Ok(Self {
            queue,
            registry,
            latch: HeavyWorkLatch::global(),
            latch_reason: DEFAULT_LATCH_REASON.to_string(),
            state: WorkerState::Idle,
        })
    }

    /// Hold `latch` instead of the global one while tasks run.
    pub fn with_latch(mut self, latch: &'static HeavyWorkLatch) -> Self {
        self.latch = latch;
        self
    }

    pub fn with_latch_reason(mut self, reason: impl Into<String>) -> Self {
        self.latch_reason = reason.into();
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run tasks until the queue is empty.
    ///
    /// `binder` is called once per task with the queue-assigned handle and
    /// returns the handle the task actually runs with. `reporter` hears about
    /// each task before it runs. Errors only if the coordinator went away.
    pub fn run<B, A>(&mut self, binder: B, reporter: &A) -> Result<WorkerReport>
    where
        B: Fn(ProgressHandle) -> ProgressHandle,
        A: ActivityReporter + ?Sized,
    {
        let mut report = WorkerReport::default();
        loop {
            self.transition(WorkerState::Fetching);
            let Some(entry) = self.queue.compute(|queue| queue.poll_next())? else {
                self.transition(WorkerState::Drained);
                info!(
                    executed = report.executed,
                    completed = report.completed,
                    cancelled = report.cancelled,
                    failed = report.failed,
                    "task queue drained"
                );
                return Ok(report);
            };

            self.transition(WorkerState::Running);
            let state = self.run_entry(&entry, &binder, reporter);
            report.record(state);
            self.transition(WorkerState::Idle);
        }
    }

    fn run_entry<B, A>(&self, entry: &TaskEntry, binder: &B, reporter: &A) -> TaskState
    where
        B: Fn(ProgressHandle) -> ProgressHandle,
        A: ActivityReporter + ?Sized,
    {
        let _dispose = DisposeOnDrop {
            registry: &self.registry,
            entry,
        };

        let span = start_task_span(entry.kind(), &entry.id().0);
        let _entered = span.enter();
        let queued = entry.advance(TaskState::Running);
        record_state_transition(&span, queued.as_str(), TaskState::Running.as_str());

        let progress = binder(entry.progress().clone());
        reporter.stage_started(entry.kind());

        let started = Instant::now();
        let result = {
            let _latch = self
                .latch
                .process_started(self.latch_reason.as_str(), LatchKind::Indexing);
            debug!(task_id = %entry.id(), kind = entry.kind(), "running task");
            panic::catch_unwind(AssertUnwindSafe(|| {
                progress.check_cancelled()?;
                progress.set_indeterminate(true);
                entry.task().run(&progress)
            }))
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let state = match result {
            Ok(Ok(())) => TaskState::Completed,
            Ok(Err(e)) if e.is_cancelled() => {
                info!(task_id = %entry.id(), "task cancelled");
                TaskState::Cancelled
            }
            Ok(Err(e)) => {
                error!(task_id = %entry.id(), kind = entry.kind(), error = %e, "task failed unexpectedly");
                TaskState::Failed
            }
            Err(payload) => {
                error!(
                    task_id = %entry.id(),
                    kind = entry.kind(),
                    panic = panic_message(payload.as_ref()),
                    "task panicked"
                );
                TaskState::Failed
            }
        };

        debug_assert!(state.is_terminal());
        entry.advance(state);
        record_state_transition(&span, TaskState::Running.as_str(), state.as_str());
        let outcome = [KeyValue::new("outcome", state.as_str())];
        metrics::task_outcomes().add(1, &outcome);
        metrics::task_duration_ms().record(duration_ms, &outcome);
        state
    }

    fn transition(&mut self, to: WorkerState) {
        trace!(from = %self.state, %to, "worker transition");
        self.state = to;
    }
}

/// Disposes the entry on every exit path, unwinding included.
struct DisposeOnDrop<'a> {
    registry: &'a TaskRegistry,
    entry: &'a TaskEntry,
}

impl Drop for DisposeOnDrop<'_> {
    fn drop(&mut self) {
        self.registry.dispose(self.entry);
    }
}

/// Drain `queue` on the calling thread with the global latch.
///
/// Must not be called from the coordinator thread.
pub fn run_queue_to_completion<B, A>(
    queue: &Coordinator<TaskQueue>,
    binder: B,
    reporter: &A,
) -> Result<WorkerReport>
where
    B: Fn(ProgressHandle) -> ProgressHandle,
    A: ActivityReporter + ?Sized,
{
    WorkerLoop::new(queue.clone())?.run(binder, reporter)
}
