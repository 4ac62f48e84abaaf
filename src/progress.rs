//! Per-task cancellation and progress state.
//!
//! A [`ProgressHandle`] is a cheap-clone reference to shared atomic state.
//! Cancellation only ever flips a flag, so `cancel` is safe to call from any
//! thread at any time, including while the task is running or being disposed.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Inner {
    cancelled: AtomicBool,
    indeterminate: AtomicBool,
    /// `f64` bits.
    fraction: AtomicU64,
    text: Mutex<String>,
    parent: Option<ProgressHandle>,
}

/// Cooperative cancellation and progress reporting for one task.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<Inner>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    /// A handle that also reports cancelled when `parent` (or any of its
    /// ancestors) is cancelled. Cancelling the child leaves the parent alone.
    pub fn child_of(parent: &ProgressHandle) -> Self {
        Self::with_parent(Some(parent.clone()))
    }

    fn with_parent(parent: Option<ProgressHandle>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                indeterminate: AtomicBool::new(false),
                fraction: AtomicU64::new(0f64.to_bits()),
                text: Mutex::new(String::new()),
                parent,
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(ProgressHandle::is_cancelled)
    }

    /// Returns `Err(Error::Cancelled)` once cancellation was requested.
    ///
    /// Task bodies call this periodically and propagate with `?`.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn set_indeterminate(&self, indeterminate: bool) {
        self.inner
            .indeterminate
            .store(indeterminate, Ordering::Relaxed);
    }

    pub fn is_indeterminate(&self) -> bool {
        self.inner.indeterminate.load(Ordering::Relaxed)
    }

    /// Set completion in `[0.0, 1.0]`. Out-of-range values are clamped.
    pub fn set_fraction(&self, fraction: f64) {
        let clamped = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.inner
            .fraction
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.inner.fraction.load(Ordering::Relaxed))
    }

    pub fn set_text(&self, text: impl Into<String>) {
        if let Ok(mut guard) = self.inner.text.lock() {
            *guard = text.into();
        }
    }

    pub fn text(&self) -> String {
        self.inner
            .text
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Do both handles refer to the same state?
    pub fn same_as(&self, other: &ProgressHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("cancelled", &self.is_cancelled())
            .field("indeterminate", &self.is_indeterminate())
            .field("fraction", &self.fraction())
            .finish()
    }
}
