//! Producer-facing facade over the coordinator, registry and worker loop.
//!
//! Mutations hop onto the coordinator thread; cancellation goes straight to
//! the shared registry from whatever thread asks for it.

use crate::config::Config;
use crate::coordinator::{Coordinator, panic_message};
use crate::error::{Error, Result};
use crate::latch::HeavyWorkLatch;
use crate::model::{PendingTask, TaskId};
use crate::progress::ProgressHandle;
use crate::queue::{TaskQueue, TaskRegistry};
use crate::task::Task;
use crate::worker::{ActivityReporter, WorkerLoop, WorkerReport};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::info;

/// A running background task queue.
///
/// Cloning gives another handle to the same queue. Producers that already
/// run on the coordinator thread must go through
/// [`coordinator`](Self::coordinator)`().dispatch(..)` instead of the
/// blocking methods here, which would otherwise fail with
/// [`Error::ReentrantCall`].
#[derive(Clone)]
pub struct BackgroundQueue {
    coordinator: Coordinator<TaskQueue>,
    registry: Arc<TaskRegistry>,
    coordinator_thread: Arc<Mutex<Option<JoinHandle<TaskQueue>>>>,
    worker_thread_name: String,
    latch: &'static HeavyWorkLatch,
    latch_reason: String,
}

impl BackgroundQueue {
    /// Start a queue with the default configuration.
    pub fn start() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    /// Start the coordinator thread described by `config`.
    pub fn with_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(TaskRegistry::new());
        let (coordinator, handle) = Coordinator::spawn(
            config.coordinator_thread_name.clone(),
            TaskQueue::with_registry(Arc::clone(&registry)),
        )?;
        info!(coordinator = %config.coordinator_thread_name, "background queue started");

        Ok(Self {
            coordinator,
            registry,
            coordinator_thread: Arc::new(Mutex::new(Some(handle))),
            worker_thread_name: config.worker_thread_name.clone(),
            latch: HeavyWorkLatch::global(),
            latch_reason: config.latch_reason.clone(),
        })
    }

    /// Hold `latch` instead of the global one while tasks run.
    pub fn with_latch(mut self, latch: &'static HeavyWorkLatch) -> Self {
        self.latch = latch;
        self
    }

    /// The coordinator thread, for queue access or other coordinator duties.
    pub fn coordinator(&self) -> &Coordinator<TaskQueue> {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Offer a task. `Ok(false)` means an equivalent task was already queued
    /// and this one has been disposed.
    pub fn enqueue<T: Task>(&self, task: T) -> Result<bool> {
        Ok(self.submit(task)?.is_some())
    }

    /// Offer a task and get its ID back if it was accepted.
    pub fn submit<T: Task>(&self, task: T) -> Result<Option<TaskId>> {
        self.submit_shared(Arc::new(task))
    }

    /// Offer a task the caller keeps a reference to.
    pub fn submit_shared(&self, task: Arc<dyn Task>) -> Result<Option<TaskId>> {
        self.coordinator.compute(move |queue| queue.submit(task))
    }

    /// Cancel a queued or running task from any thread. Returns whether the
    /// task was still live.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.registry.cancel(id)
    }

    /// Cancel every queued and running task from any thread.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Drop all queued tasks without running them.
    pub fn clear(&self) -> Result<()> {
        self.coordinator.compute(|queue| queue.clear())
    }

    /// Cancel and dispose every task with a live handle.
    pub fn dispose_all_pending(&self) -> Result<usize> {
        self.coordinator.compute(|queue| queue.dispose_all_pending())
    }

    pub fn pending(&self) -> Result<Vec<PendingTask>> {
        self.coordinator.compute(|queue| queue.pending())
    }

    pub fn len(&self) -> Result<usize> {
        self.coordinator.compute(|queue| queue.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.coordinator.compute(|queue| queue.is_empty())
    }

    /// Drain the queue on the calling thread. Blocks until the queue is empty.
    pub fn run_queue_to_completion<B, A>(&self, binder: B, reporter: &A) -> Result<WorkerReport>
    where
        B: Fn(ProgressHandle) -> ProgressHandle,
        A: ActivityReporter + ?Sized,
    {
        self.worker_loop()?.run(binder, reporter)
    }

    /// Drain the queue on a new worker thread.
    pub fn spawn_worker<B, A>(
        &self,
        binder: B,
        reporter: A,
    ) -> Result<JoinHandle<Result<WorkerReport>>>
    where
        B: Fn(ProgressHandle) -> ProgressHandle + Send + 'static,
        A: ActivityReporter + Send + 'static,
    {
        let mut worker = self.worker_loop()?;
        let handle = thread::Builder::new()
            .name(self.worker_thread_name.clone())
            .spawn(move || worker.run(binder, &reporter))?;
        Ok(handle)
    }

    /// Dispose everything still pending and stop the coordinator thread.
    ///
    /// Other handles to this queue fail with [`Error::CoordinatorClosed`]
    /// afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let disposed = self.dispose_all_pending()?;
        self.coordinator.stop();

        let handle = self
            .coordinator_thread
            .lock()
            .map_err(|_| Error::Other("coordinator handle lock poisoned".to_string()))?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|payload| {
                Error::Other(format!(
                    "coordinator thread panicked: {}",
                    panic_message(payload.as_ref())
                ))
            })?;
        }
        info!(disposed, "background queue shut down");
        Ok(())
    }

    fn worker_loop(&self) -> Result<WorkerLoop> {
        Ok(WorkerLoop::new(self.coordinator.clone())?
            .with_latch(self.latch)
            .with_latch_reason(self.latch_reason.clone()))
    }
}
