//! Tests for the heavy-work latch.

use std::panic::{self, AssertUnwindSafe};
use taskq::latch::{HeavyWorkLatch, LatchKind};

#[test]
fn token_holds_latch_until_dropped() {
    let latch = HeavyWorkLatch::new();
    assert!(!latch.is_running());

    let token = latch.process_started("Performing indexing tasks", LatchKind::Indexing);
    assert!(latch.is_running());
    assert!(latch.is_running_kind(LatchKind::Indexing));
    assert!(!latch.is_running_kind(LatchKind::Syncing));
    assert_eq!(latch.reasons(), vec!["Performing indexing tasks".to_string()]);

    drop(token);
    assert!(!latch.is_running());
}

#[test]
fn nested_tokens_are_counted() {
    let latch = HeavyWorkLatch::new();
    let a = latch.process_started("a", LatchKind::Indexing);
    let b = latch.process_started("b", LatchKind::Processing);
    assert_eq!(latch.active_count(), 2);

    drop(a);
    assert_eq!(latch.active_count(), 1);
    assert!(latch.is_running_kind(LatchKind::Processing));
    drop(b);
    assert_eq!(latch.active_count(), 0);
}

#[test]
fn latch_is_released_when_work_panics() {
    let latch = HeavyWorkLatch::new();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _token = latch.process_started("doomed", LatchKind::Syncing);
        panic!("work failed");
    }));
    assert!(result.is_err());
    assert!(!latch.is_running());
}
