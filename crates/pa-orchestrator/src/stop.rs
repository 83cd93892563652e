//! Per-query stop flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation signal for one query/response cycle.
///
/// Every query gets a fresh flag; the response handler of that query keeps
/// its own clone, so setting the flag of one cycle never affects another.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the cycle as stopped
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the cycle has been stopped
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
