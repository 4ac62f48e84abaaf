//! Task execution span helpers.
//!
//! Provides span creation and state-transition recording for tasks run by
//! the worker loop.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one task execution.
///
/// The `task.state` field is declared empty and can be filled in via
/// [`record_state_transition`].
pub fn start_task_span(kind: &str, task_id: &Uuid) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.kind" = kind,
        "task.id" = %task_id,
        "task.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
///
/// Updates `task.state` and emits a `debug` event scoped to the span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.state", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
