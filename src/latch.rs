//! Process-wide advisory marker for heavy background work.
//!
//! Other subsystems consult it to defer their own expensive work while an
//! index rebuild is in flight. It has no effect on queue correctness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};
use tracing::debug;

static GLOBAL: LazyLock<HeavyWorkLatch> = LazyLock::new(HeavyWorkLatch::new);

/// What sort of heavy work is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatchKind {
    Indexing,
    Syncing,
    Processing,
}

/// Counts active heavy operations, keyed by token.
pub struct HeavyWorkLatch {
    next_token: AtomicU64,
    active: Mutex<HashMap<u64, (LatchKind, String)>>,
}

impl HeavyWorkLatch {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// The shared instance used by the worker loop.
    pub fn global() -> &'static HeavyWorkLatch {
        &GLOBAL
    }

    /// Mark heavy work as started. The returned token releases it on drop.
    pub fn process_started(&self, reason: impl Into<String>, kind: LatchKind) -> LatchToken<'_> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let reason = reason.into();
        debug!(token, ?kind, %reason, "heavy work started");
        self.lock().insert(token, (kind, reason));
        LatchToken { latch: self, token }
    }

    pub fn is_running(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn is_running_kind(&self, kind: LatchKind) -> bool {
        self.lock().values().any(|(k, _)| *k == kind)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Reasons of all active operations, in no particular order.
    pub fn reasons(&self) -> Vec<String> {
        self.lock().values().map(|(_, r)| r.clone()).collect()
    }

    fn release(&self, token: u64) {
        if self.lock().remove(&token).is_some() {
            debug!(token, "heavy work finished");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, (LatchKind, String)>> {
        // A panic while holding this lock cannot leave the map inconsistent.
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for HeavyWorkLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped acquisition of a [`HeavyWorkLatch`].
#[must_use = "the latch is released as soon as the token is dropped"]
pub struct LatchToken<'a> {
    latch: &'a HeavyWorkLatch,
    token: u64,
}

impl Drop for LatchToken<'_> {
    fn drop(&mut self) {
        self.latch.release(self.token);
    }
}
