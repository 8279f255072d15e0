//! Shared helpers for coordinator tests.

use crate::coordinator::Coordinator;
use crate::operations::Operation;
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;

/// Route `log::*` output from the code under test through env_logger.
/// Idempotent across the test binary.
pub fn init_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Poll until the operation reaches a terminal status.
///
/// Under `start_paused` runtimes the sleeps auto-advance, so the wait
/// costs no wall-clock time; with real time the budget is one second.
pub async fn wait_for_terminal(coordinator: &Coordinator, id: Uuid) -> Operation {
    for _ in 0..500 {
        if let Some(op) = coordinator.get(id) {
            if op.status.is_terminal() {
                return op;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("operation {} did not reach a terminal status", id);
}
