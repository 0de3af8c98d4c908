//! Concurrency limiter: bounds the number of requests executing at once.

use std::sync::Arc;

use super::core::{Capacity, Core};
use super::ledger::PermitLedger;
use super::Lease;
use crate::config::ConcurrencyConfig;
use crate::error::Result;

struct ConcurrencyState {
    ledger: PermitLedger,
}

impl Capacity for ConcurrencyState {
    // The one variant where completed work returns its capacity.
    const RETURNS_PERMITS: bool = true;

    fn try_consume(&mut self, permits: u32) -> bool {
        self.ledger.try_consume(permits)
    }

    fn refund(&mut self, permits: u32) {
        self.ledger.release(permits);
    }

    fn limit(&self) -> u32 {
        self.ledger.limit()
    }

    fn available(&self) -> u32 {
        self.ledger.available()
    }
}

/// Limits how many requests hold permits at the same time.
///
/// Granted leases carry a release capability: the caller must release the
/// lease (explicitly or by dropping it) when the protected work completes,
/// which returns the permits and may unblock the head of the wait queue.
pub struct ConcurrencyLimiter {
    core: Arc<Core<ConcurrencyState>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter from its configuration.
    pub fn new(config: &ConcurrencyConfig) -> Result<Self> {
        config.validate()?;
        let core = Core::new(
            ConcurrencyState {
                ledger: PermitLedger::new(config.permit_limit),
            },
            config.queue_limit,
            config.queue_order,
        );
        Ok(Self { core })
    }

    /// Attempt to acquire `permits` without suspending.
    pub fn try_acquire(&self, permits: u32) -> Lease {
        self.core.try_acquire(permits)
    }

    /// Acquire `permits`, suspending in the wait queue if necessary.
    pub async fn acquire(&self, permits: u32) -> Lease {
        self.core.acquire(permits).await
    }

    /// Permits currently available.
    pub fn available_permits(&self) -> u32 {
        self.core.available()
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        self.core.queued_count()
    }

    /// Reject all queued acquisitions and stop granting new ones.
    pub fn shutdown(&self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::QueueOrder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn limiter(permit_limit: u32, queue_limit: usize, queue_order: QueueOrder) -> ConcurrencyLimiter {
        ConcurrencyLimiter::new(&ConcurrencyConfig {
            permit_limit,
            queue_limit,
            queue_order,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_third_acquire_rejected_without_queue() {
        let limiter = limiter(2, 0, QueueOrder::OldestFirst);

        let first = limiter.try_acquire(1);
        let second = limiter.try_acquire(1);
        assert!(first.is_acquired());
        assert!(second.is_acquired());

        let third = limiter.try_acquire(1);
        assert!(!third.is_acquired());

        // Releasing one lease makes a subsequent acquire succeed.
        first.release();
        let retry = limiter.acquire(1).await;
        assert!(retry.is_acquired());
    }

    #[tokio::test]
    async fn test_release_unblocks_queued_acquire() {
        let limiter = Arc::new(limiter(1, 4, QueueOrder::OldestFirst));

        let held = limiter.try_acquire(1);
        assert!(held.is_acquired());

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };

        // Let the waiter enqueue.
        while limiter.queued_count() == 0 {
            tokio::task::yield_now().await;
        }

        held.release();
        let lease = waiter.await.unwrap();
        assert!(lease.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_first_grants_in_arrival_order() {
        let limiter = Arc::new(limiter(1, 8, QueueOrder::OldestFirst));
        let held = limiter.try_acquire(1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["a", "b", "c"] {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let lease = limiter.acquire(1).await;
                tx.send(name).unwrap();
                lease.release();
            });
            // Deterministic arrival order.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(limiter.queued_count(), 3);

        held.release();
        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, Some("b"));
        assert_eq!(rx.recv().await, Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_first_grants_most_recent() {
        let limiter = Arc::new(limiter(1, 8, QueueOrder::NewestFirst));
        let held = limiter.try_acquire(1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["a", "b", "c"] {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let lease = limiter.acquire(1).await;
                tx.send(name).unwrap();
                lease.release();
            });
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        held.release();
        assert_eq!(rx.recv().await, Some("c"));
        assert_eq!(rx.recv().await, Some("b"));
        assert_eq!(rx.recv().await, Some("a"));
    }

    #[test]
    fn test_queued_acquire_is_pending_until_release() {
        use tokio_test::{assert_pending, assert_ready};

        let limiter = Arc::new(limiter(1, 2, QueueOrder::OldestFirst));
        let held = limiter.try_acquire(1);

        let waiter = limiter.clone();
        let mut acquire = tokio_test::task::spawn(async move { waiter.acquire(1).await });
        assert_pending!(acquire.poll());
        assert_eq!(limiter.queued_count(), 1);

        held.release();
        assert!(acquire.is_woken());
        let lease = assert_ready!(acquire.poll());
        assert!(lease.is_acquired());
    }

    #[tokio::test]
    async fn test_queue_limit_rejects_synchronously() {
        let limiter = Arc::new(limiter(1, 1, QueueOrder::OldestFirst));
        let _held = limiter.try_acquire(1);

        let queued = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };
        while limiter.queued_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Queue is at capacity; this acquire fails without suspending.
        let overflow = limiter.acquire(1).await;
        assert!(!overflow.is_acquired());

        limiter.shutdown();
        assert!(!queued.await.unwrap().is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_queue_and_others() {
        let limiter = Arc::new(limiter(1, 4, QueueOrder::OldestFirst));
        let held = limiter.try_acquire(1);

        let survivor = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };
        while limiter.queued_count() == 0 {
            tokio::task::yield_now().await;
        }

        // A second waiter that gives up after 5ms.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(5), limiter.acquire(1)).await;
        assert!(cancelled.is_err());
        assert_eq!(limiter.queued_count(), 1);

        held.release();
        assert!(survivor.await.unwrap().is_acquired());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected_not_queued() {
        let limiter = limiter(2, 4, QueueOrder::OldestFirst);

        let lease = limiter.acquire(3).await;
        assert!(!lease.is_acquired());
        assert_eq!(limiter.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_double_release_does_not_double_credit() {
        let limiter = limiter(2, 0, QueueOrder::OldestFirst);

        let first = limiter.try_acquire(2);
        assert_eq!(limiter.available_permits(), 0);

        first.release();
        first.release();
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_limit() {
        use rand::Rng;

        const LIMIT: u32 = 5;
        let limiter = Arc::new(limiter(LIMIT, 0, QueueOrder::OldestFirst));
        let active = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let mut rng = rand::rngs::OsRng;
                for _ in 0..50 {
                    let permits = rng.gen_range(1..=2);
                    let lease = limiter.try_acquire(permits);
                    if lease.is_acquired() {
                        let now = active.fetch_add(permits, Ordering::SeqCst) + permits;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(now <= LIMIT, "permit limit overshoot: {}", now);
                        tokio::task::yield_now().await;
                        active.fetch_sub(permits, Ordering::SeqCst);
                        lease.release();
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.available_permits(), LIMIT);
        assert!(peak.load(Ordering::SeqCst) <= LIMIT);
    }
}
