//! Cooperative cancellation of running file pipelines

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reads processed between two cancellation checks
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Cloneable flag shared between a controller and its pipelines
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True when `processed` hits a check point and cancellation was requested
    pub fn should_stop(&self, processed: u64) -> bool {
        processed % CANCEL_CHECK_INTERVAL == 0 && self.is_cancelled()
    }
}
