//! Sliding window limiter: bounds the number of requests in a trailing
//! interval, approximated by a ring of segment counters.

use std::sync::Arc;

use super::core::{Capacity, Core};
use super::ledger::PermitLedger;
use super::replenish::Replenisher;
use super::Lease;
use crate::config::SlidingWindowConfig;
use crate::error::Result;

struct SlidingWindowState {
    ledger: PermitLedger,
    /// Per-segment consumed counts; together they sum to `ledger.consumed()`.
    segments: Vec<u32>,
    /// Index of the segment new consumption is charged to.
    current: usize,
}

impl Capacity for SlidingWindowState {
    fn try_consume(&mut self, permits: u32) -> bool {
        if self.ledger.try_consume(permits) {
            self.segments[self.current] += permits;
            true
        } else {
            false
        }
    }

    fn refund(&mut self, permits: u32) {
        self.ledger.release(permits);
        self.segments[self.current] = self.segments[self.current].saturating_sub(permits);
    }

    fn replenish(&mut self) {
        // Advance the ring: the slot being reused is the oldest segment,
        // whose count leaves the trailing window.
        self.current = (self.current + 1) % self.segments.len();
        let retired = self.segments[self.current];
        self.segments[self.current] = 0;
        self.ledger.release(retired);
    }

    fn limit(&self) -> u32 {
        self.ledger.limit()
    }

    fn available(&self) -> u32 {
        self.ledger.available()
    }
}

/// Limits how many requests are admitted within a trailing time window.
///
/// The window is divided into `segments_per_window` segments; the effective
/// count is the sum over all segments still inside the window. Each timer
/// tick (one segment duration) retires the oldest segment and opens a new
/// current one, then drains the wait queue with the freed capacity. Larger
/// segment counts reduce boundary burstiness at higher bookkeeping cost.
pub struct SlidingWindowLimiter {
    core: Arc<Core<SlidingWindowState>>,
    replenisher: Replenisher,
}

impl SlidingWindowLimiter {
    /// Create a limiter from its configuration and start its segment timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &SlidingWindowConfig) -> Result<Self> {
        config.validate()?;
        let core = Core::new(
            SlidingWindowState {
                ledger: PermitLedger::new(config.permit_limit),
                segments: vec![0; config.segments_per_window as usize],
                current: 0,
            },
            config.queue_limit,
            config.queue_order,
        );
        let replenisher = Replenisher::spawn(Arc::downgrade(&core), config.segment_duration());
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

    /// Permits still available in the trailing window.
    pub fn available_permits(&self) -> u32 {
        self.core.available()
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        self.core.queued_count()
    }

    /// Stop the segment timer and reject all queued acquisitions.
    pub fn shutdown(&self) {
        self.replenisher.shutdown();
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::QueueOrder;
    use std::time::Duration;

    fn config(
        permit_limit: u32,
        window_ms: u64,
        segments_per_window: u32,
        queue_limit: usize,
    ) -> SlidingWindowConfig {
        SlidingWindowConfig {
            permit_limit,
            window_ms,
            segments_per_window,
            queue_limit,
            queue_order: QueueOrder::OldestFirst,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_window_sum_never_exceeds_limit() {
        let limiter = SlidingWindowLimiter::new(&config(1, 10_000, 2, 0)).unwrap();

        assert!(limiter.try_acquire(1).is_acquired());

        // 1ms later, same window: rejected.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!limiter.try_acquire(1).is_acquired());

        // After one segment (5s) the grant is still inside the trailing
        // window, so the sum is still at the limit.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(!limiter.try_acquire(1).is_acquired());

        // After the full window the original grant has expired.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(limiter.try_acquire(1).is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_frees_per_segment() {
        let limiter = SlidingWindowLimiter::new(&config(4, 8_000, 4, 0)).unwrap();

        // Two grants in the first segment, two in the third.
        assert!(limiter.try_acquire(2).is_acquired());
        tokio::time::sleep(Duration::from_millis(4_001)).await;
        assert!(limiter.try_acquire(2).is_acquired());
        assert!(!limiter.try_acquire(1).is_acquired());

        // When the first segment leaves the window, only its two permits
        // come back.
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(limiter.available_permits(), 2);
        assert!(limiter.try_acquire(2).is_acquired());
        assert!(!limiter.try_acquire(1).is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_rollover_drains_queue() {
        let limiter = Arc::new(SlidingWindowLimiter::new(&config(1, 10_000, 2, 2)).unwrap());

        assert!(limiter.try_acquire(1).is_acquired());

        let queued = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };
        while limiter.queued_count() == 0 {
            tokio::task::yield_now().await;
        }

        // The grant expires after the full window; the queued request is
        // granted by that tick's drain.
        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert!(queued.await.unwrap().is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_segment_behaves_like_fixed_window() {
        let limiter = SlidingWindowLimiter::new(&config(2, 1_000, 1, 0)).unwrap();

        assert!(limiter.try_acquire(2).is_acquired());
        assert!(!limiter.try_acquire(1).is_acquired());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(limiter.try_acquire(2).is_acquired());
    }
}
