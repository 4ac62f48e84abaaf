//! Metric instrument factories for taskq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq")
}

/// Counter: tasks offered to the queue.
/// Labels: `result` ("accepted" | "duplicate").
pub fn tasks_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.enqueued")
        .with_description("Number of tasks offered to the queue")
        .build()
}

/// Counter: tasks dropped at dequeue because they were cancelled while queued.
pub fn tasks_skipped() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.skipped")
        .with_description("Tasks cancelled before they started")
        .build()
}

/// Counter: tasks that ran, by outcome.
/// Labels: `outcome` ("completed" | "cancelled" | "failed").
pub fn task_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.outcomes")
        .with_description("Number of tasks run, by outcome")
        .build()
}

/// Histogram: task run duration in milliseconds.
/// Labels: `outcome`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.task.duration_ms")
        .with_description("Task run duration in milliseconds")
        .with_unit("ms")
        .build()
}
