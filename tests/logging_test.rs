//! Integration tests for what the worker loop logs about task outcomes.
//!
//! Each test installs a thread-local `fmt` subscriber that writes into a
//! buffer and drains the queue on the same thread.

mod common;

use common::{Behavior, Recorder, TestTask, private_latch};
use pretty_assertions::assert_eq;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use taskq::BackgroundQueue;
use taskq::worker::{NoopActivity, WorkerReport, identity_binder};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn at_level(&self, level: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.trim_start().starts_with(level))
            .collect()
    }
}

/// Run `f` with every event on this thread captured.
fn capture<R>(f: impl FnOnce() -> R) -> (R, Captured) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, captured)
}

fn test_queue() -> BackgroundQueue {
    BackgroundQueue::start().unwrap().with_latch(private_latch())
}

#[test]
fn failing_task_is_logged_as_one_error() {
    let recorder = Recorder::new();
    let queue = test_queue();
    queue
        .enqueue(TestTask::new("fails", &recorder).behavior(Behavior::Fail))
        .unwrap();
    queue.enqueue(TestTask::new("fine", &recorder)).unwrap();

    let (report, logs) = capture(|| {
        queue
            .run_queue_to_completion(identity_binder, &NoopActivity)
            .unwrap()
    });

    assert_eq!(report.failed, 1);
    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert!(errors[0].contains("task failed unexpectedly"));
    assert!(errors[0].contains("fails"));
}

#[test]
fn panicking_task_is_logged_as_one_error() {
    let recorder = Recorder::new();
    let queue = test_queue();
    queue
        .enqueue(TestTask::new("panics", &recorder).behavior(Behavior::Panic))
        .unwrap();

    let (report, logs) = capture(|| {
        queue
            .run_queue_to_completion(identity_binder, &NoopActivity)
            .unwrap()
    });

    assert_eq!(report.failed, 1);
    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert!(errors[0].contains("task panicked"));
}

#[test]
fn cancelled_tasks_are_never_logged_as_errors() {
    let recorder = Recorder::new();
    let queue = test_queue();
    let (started_tx, started_rx) = mpsc::channel();

    let running = queue
        .submit(
            TestTask::new("running", &recorder)
                .behavior(Behavior::SpinUntilCancelled)
                .notify_started(started_tx),
        )
        .unwrap()
        .unwrap();
    let queued = queue
        .submit(TestTask::new("queued", &recorder))
        .unwrap()
        .unwrap();
    assert!(queue.cancel_task(queued));

    let canceller = {
        let queue = queue.clone();
        thread::spawn(move || {
            started_rx.recv_timeout(WAIT).unwrap();
            queue.cancel_task(running)
        })
    };

    let (report, logs) = capture(|| {
        queue
            .run_queue_to_completion(identity_binder, &NoopActivity)
            .unwrap()
    });
    assert!(canceller.join().unwrap());

    assert_eq!(
        report,
        WorkerReport {
            executed: 1,
            completed: 0,
            cancelled: 1,
            failed: 0,
        }
    );
    assert_eq!(recorder.runs(), vec!["running"]);
    let errors = logs.at_level("ERROR");
    assert!(errors.is_empty(), "{errors:#?}");
    let cancelled: Vec<String> = logs
        .at_level("INFO")
        .into_iter()
        .filter(|line| line.contains("task cancelled"))
        .collect();
    assert_eq!(cancelled.len(), 1, "{cancelled:#?}");
}
