//! Cancellable scheduled callback
//!
//! Used as the wall-clock fallback of shutdown: the callback runs once the
//! delay elapses unless [`Deadline::cancel`] wins first. Firing and
//! cancelling are decided by a single compare-and-swap, so exactly one of
//! them takes effect.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// A callback scheduled to run after a delay
pub struct Deadline {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl Deadline {
    /// Run `callback` after `delay` unless cancelled first
    pub fn schedule<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let cancel = CancellationToken::new();

        let task_state = Arc::clone(&state);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if task_state
                        .compare_exchange(PENDING, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        tracing::debug!("Deadline of {:?} reached", delay);
                        callback();
                    }
                }
                _ = task_cancel.cancelled() => {}
            }
        });

        Self { state, cancel }
    }

    /// Cancel the callback.
    ///
    /// Returns true if this call prevented the callback from running, false
    /// if it had already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.cancel.cancel();
        won
    }

    /// Whether the callback has run
    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// Whether the deadline is still armed
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }
}
