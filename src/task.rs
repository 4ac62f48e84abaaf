//! The unit of work the queue schedules.

use crate::error::Result;
use crate::model::EquivalenceKey;
use crate::progress::ProgressHandle;

/// A long-running background job.
///
/// Tasks are shared between the coordinator and worker threads, so every
/// method takes `&self`; use interior mutability for per-run state.
pub trait Task: Send + Sync + 'static {
    /// Dedup key. A task whose key matches an already queued task is
    /// rejected and disposed on enqueue.
    fn equivalence_key(&self) -> EquivalenceKey;

    /// Do the work. Call `progress.check_cancelled()?` often enough to stay
    /// responsive; there is no other way to stop a running task.
    fn run(&self, progress: &ProgressHandle) -> Result<()>;

    /// Release resources. Called exactly once per accepted or rejected task,
    /// whether it ran, was skipped, or was torn down.
    fn dispose(&self) {}

    /// Category label for activity reporting and spans.
    fn kind(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type RunFn = Box<dyn Fn(&ProgressHandle) -> Result<()> + Send + Sync>;
type DisposeFn = Box<dyn Fn() + Send + Sync>;

/// Closure-backed [`Task`].
pub struct FnTask {
    kind: String,
    key: EquivalenceKey,
    run: RunFn,
    on_dispose: Option<DisposeFn>,
}

impl FnTask {
    pub fn new(
        kind: impl Into<String>,
        key: impl Into<EquivalenceKey>,
        run: impl Fn(&ProgressHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
            run: Box::new(run),
            on_dispose: None,
        }
    }

    pub fn on_dispose(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_dispose = Some(Box::new(hook));
        self
    }
}

impl Task for FnTask {
    fn equivalence_key(&self) -> EquivalenceKey {
        self.key.clone()
    }

    fn run(&self, progress: &ProgressHandle) -> Result<()> {
        (self.run)(progress)
    }

    fn dispose(&self) {
        if let Some(ref hook) = self.on_dispose {
            hook();
        }
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

impl std::fmt::Debug for FnTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish()
    }
}
