//! # taskq
//!
//! Single-consumer background task queue for long-running maintenance work
//! such as index rebuilds.
//!
//! Queue mutations run on one coordinator thread (see [`coordinator`]),
//! task bodies run one at a time on a worker thread (see [`worker`]), and
//! every queued or running task carries a [`progress::ProgressHandle`] that
//! can be cancelled from any thread.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod latch;
pub mod model;
pub mod progress;
pub mod queue;
pub mod service;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use error::{Error, Result};
pub use progress::ProgressHandle;
pub use service::BackgroundQueue;
pub use task::Task;
