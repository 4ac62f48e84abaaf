//! Shared test tasks.

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use taskq::latch::HeavyWorkLatch;
use taskq::model::EquivalenceKey;
use taskq::progress::ProgressHandle;
use taskq::{Error, Result, Task};

/// What a [`TestTask`] does when run.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Complete,
    Fail,
    Panic,
    /// Poll `check_cancelled` until cancelled (gives up after a few seconds).
    SpinUntilCancelled,
}

/// Records what happened to every task that shares it.
#[derive(Default)]
pub struct Recorder {
    runs: Mutex<Vec<String>>,
    disposals: Mutex<Vec<String>>,
    latch_seen: Mutex<Vec<bool>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    pub fn disposals(&self) -> Vec<String> {
        self.disposals.lock().unwrap().clone()
    }

    pub fn disposal_count(&self, name: &str) -> usize {
        self.disposals().iter().filter(|n| *n == name).count()
    }

    pub fn latch_seen(&self) -> Vec<bool> {
        self.latch_seen.lock().unwrap().clone()
    }
}

pub struct TestTask {
    name: String,
    key: EquivalenceKey,
    behavior: Behavior,
    recorder: Arc<Recorder>,
    started: Option<mpsc::Sender<String>>,
    latch: Option<&'static HeavyWorkLatch>,
}

impl TestTask {
    pub fn new(name: &str, recorder: &Arc<Recorder>) -> Self {
        Self {
            name: name.to_string(),
            key: EquivalenceKey::new(name),
            behavior: Behavior::Complete,
            recorder: Arc::clone(recorder),
            started: None,
            latch: None,
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = EquivalenceKey::new(key);
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Send the task name on `tx` as soon as `run` starts.
    pub fn notify_started(mut self, tx: mpsc::Sender<String>) -> Self {
        self.started = Some(tx);
        self
    }

    /// Record whether `latch` is held while running.
    pub fn observe_latch(mut self, latch: &'static HeavyWorkLatch) -> Self {
        self.latch = Some(latch);
        self
    }
}

impl Task for TestTask {
    fn equivalence_key(&self) -> EquivalenceKey {
        self.key.clone()
    }

    fn run(&self, progress: &ProgressHandle) -> Result<()> {
        self.recorder.runs.lock().unwrap().push(self.name.clone());
        if let Some(latch) = self.latch {
            self.recorder.latch_seen.lock().unwrap().push(latch.is_running());
        }
        if let Some(ref tx) = self.started {
            let _ = tx.send(self.name.clone());
        }

        match self.behavior {
            Behavior::Complete => Ok(()),
            Behavior::Fail => Err(Error::Task(format!("{} broke", self.name))),
            Behavior::Panic => panic!("{} panicked", self.name),
            Behavior::SpinUntilCancelled => {
                let deadline = Instant::now() + Duration::from_secs(10);
                while Instant::now() < deadline {
                    progress.check_cancelled()?;
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(Error::Task(format!("{} was never cancelled", self.name)))
            }
        }
    }

    fn dispose(&self) {
        self.recorder.disposals.lock().unwrap().push(self.name.clone());
    }

    fn kind(&self) -> &str {
        &self.name
    }
}

/// A latch private to one test, so parallel tests don't see each other.
pub fn private_latch() -> &'static HeavyWorkLatch {
    Box::leak(Box::new(HeavyWorkLatch::new()))
}
