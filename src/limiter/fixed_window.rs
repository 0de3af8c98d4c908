//! Fixed window limiter: bounds the number of requests per fixed interval.

use std::sync::Arc;

use super::core::{Capacity, Core};
use super::ledger::PermitLedger;
use super::replenish::Replenisher;
use super::Lease;
use crate::config::FixedWindowConfig;
use crate::error::Result;

struct FixedWindowState {
    ledger: PermitLedger,
}

impl Capacity for FixedWindowState {
    fn try_consume(&mut self, permits: u32) -> bool {
        self.ledger.try_consume(permits)
    }

    fn refund(&mut self, permits: u32) {
        self.ledger.release(permits);
    }

    fn replenish(&mut self) {
        // Window rollover: the whole budget becomes available again.
        let consumed = self.ledger.consumed();
        self.ledger.release(consumed);
    }

    fn limit(&self) -> u32 {
        self.ledger.limit()
    }

    fn available(&self) -> u32 {
        self.ledger.available()
    }
}

/// Limits how many requests are admitted per fixed time window.
///
/// Permits are never returned by callers; the window rollover, driven by
/// the background replenisher, resets the count and drains the wait queue.
/// Rollover and queue drain happen in one critical section, so a rollover
/// is always processed before any acquisition evaluated at the same
/// instant. The timer is the single authority for window boundaries: if a
/// tick is delayed, the current window briefly extends until the tick
/// lands, and the next window runs on the normal schedule.
pub struct FixedWindowLimiter {
    core: Arc<Core<FixedWindowState>>,
    replenisher: Replenisher,
}

impl FixedWindowLimiter {
    /// Create a limiter from its configuration and start its window timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &FixedWindowConfig) -> Result<Self> {
        config.validate()?;
        let core = Core::new(
            FixedWindowState {
                ledger: PermitLedger::new(config.permit_limit),
            },
            config.queue_limit,
            config.queue_order,
        );
        let replenisher = Replenisher::spawn(Arc::downgrade(&core), config.window());
        Ok(Self { core, replenisher })
    }

    /// Attempt to acquire `permits` without suspending.
    pub fn try_acquire(&self, permits: u32) -> Lease {
        self.core.try_acquire(permits)
    }

    /// Acquire `permits`, suspending in the wait queue if necessary.
    pub async fn acquire(&self, permits: u32) -> Lease {
        self.core.acquire(permits).await
    }

    /// Permits still available in the current window.
    pub fn available_permits(&self) -> u32 {
        self.core.available()
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        self.core.queued_count()
    }

    /// Stop the window timer and reject all queued acquisitions.
    pub fn shutdown(&self) {
        self.replenisher.shutdown();
        self.core.close();
    }
}
