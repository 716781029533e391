//! Process-wide cache flush switch
//!
//! Once triggered, every freshness check reports stale until the process
//! restarts. The cache only sees the [`Staleness`] capability.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Answers whether cached variants must be treated as stale.
pub trait Staleness: Send + Sync {
    fn is_stale(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct FlushController {
    active: AtomicBool,
}

impl FlushController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start regenerating every variant for the rest of the process lifetime.
    pub fn trigger(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("Flush triggered, cached variants will be regenerated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Staleness for FlushController {
    fn is_stale(&self) -> bool {
        self.is_active()
    }
}
