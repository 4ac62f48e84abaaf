//! Coordinator bridge: run closures on one designated thread.
//!
//! A [`Coordinator`] owns a piece of state `S` on a dedicated thread. Other
//! threads reach that state only by sending it a job, either synchronously
//! ([`compute`](Coordinator::compute), which blocks until the result comes
//! back) or fire-and-forget ([`dispatch`](Coordinator::dispatch)). Jobs run
//! one at a time in the order they were sent, so each job sees a consistent
//! snapshot of the state.

use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Job(Job<S>),
    Stop,
}

/// Handle to a coordinator thread. Cheap to clone.
pub struct Coordinator<S> {
    jobs: mpsc::UnboundedSender<Message<S>>,
    thread_id: ThreadId,
    name: Arc<str>,
}

impl<S> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            thread_id: self.thread_id,
            name: Arc::clone(&self.name),
        }
    }
}

impl<S: Send + 'static> Coordinator<S> {
    /// Start the coordinator thread, moving `state` onto it.
    ///
    /// The thread runs until [`stop`](Self::stop) is called or every handle
    /// is dropped; joining it yields the final state.
    pub fn spawn(name: impl Into<String>, state: S) -> Result<(Self, JoinHandle<S>)> {
        let name: String = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message<S>>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut state = state;
            debug!(coordinator = %thread_name, "coordinator started");
            while let Some(message) = rx.blocking_recv() {
                match message {
                    Message::Job(job) => job(&mut state),
                    Message::Stop => break,
                }
            }
            debug!(coordinator = %thread_name, "coordinator stopped");
            state
        })?;

        let coordinator = Self {
            jobs: tx,
            thread_id: handle.thread().id(),
            name: Arc::from(name),
        };
        Ok((coordinator, handle))
    }

    /// Run `f` on the coordinator thread and wait for its result.
    ///
    /// A panic inside `f` is caught on the coordinator thread (which keeps
    /// running) and returned here as an error. Calling this from the
    /// coordinator thread itself would deadlock, so it fails with
    /// [`Error::ReentrantCall`] instead.
    pub fn compute<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_coordinator_thread() {
            return Err(Error::ReentrantCall);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state: &mut S| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(state)));
            // The caller may have given up waiting; nothing to do then.
            let _ = reply_tx.send(result);
        });
        self.jobs
            .send(Message::Job(job))
            .map_err(|_| Error::CoordinatorClosed)?;

        match reply_rx.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(Error::Other(format!(
                "coordinator job panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(Error::CoordinatorClosed),
        }
    }

    /// Queue `f` to run on the coordinator thread without waiting for it.
    /// Safe to call from the coordinator thread.
    pub fn dispatch<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let name = Arc::clone(&self.name);
        let job: Job<S> = Box::new(move |state: &mut S| {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(state))) {
                error!(
                    coordinator = %name,
                    panic = panic_message(payload.as_ref()),
                    "dispatched job panicked"
                );
            }
        });
        self.jobs
            .send(Message::Job(job))
            .map_err(|_| Error::CoordinatorClosed)
    }

    /// Ask the coordinator thread to exit after the jobs already queued.
    /// Later calls fail with [`Error::CoordinatorClosed`].
    pub fn stop(&self) {
        let _ = self.jobs.send(Message::Stop);
    }
}

impl<S> Coordinator<S> {
    pub fn is_coordinator_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Has the coordinator thread gone away?
    pub fn is_closed(&self) -> bool {
        self.jobs.is_closed()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
