//! Error types for taskq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Cooperative cancellation signal raised by `ProgressHandle::check_cancelled`.
    /// This is the normal exit for a cancelled task, not a failure.
    #[error("task cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Task(String),

    #[error("coordinator thread is no longer running")]
    CoordinatorClosed,

    #[error("coordinator call issued from the coordinator thread itself")]
    ReentrantCall,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this the cancellation signal rather than a real failure?
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
