//! Token bucket limiter: requests spend tokens that refill on a schedule,
//! up to a cap.

use std::sync::Arc;

use super::core::{Capacity, Core};
use super::ledger::PermitLedger;
use super::replenish::Replenisher;
use super::Lease;
use crate::config::TokenBucketConfig;
use crate::error::Result;

struct TokenBucketState {
    /// Available tokens are `ledger.available()`; a refill releases
    /// consumed capacity, which the ledger floors at zero, giving the
    /// token cap for free.
    ledger: PermitLedger,
    tokens_per_period: u32,
}

impl Capacity for TokenBucketState {
    fn try_consume(&mut self, permits: u32) -> bool {
        self.ledger.try_consume(permits)
    }

    fn refund(&mut self, permits: u32) {
        self.ledger.release(permits);
    }

    fn replenish(&mut self) {
        self.ledger.release(self.tokens_per_period);
    }

    fn limit(&self) -> u32 {
        self.ledger.limit()
    }

    fn available(&self) -> u32 {
        self.ledger.available()
    }
}

/// Limits requests by spending tokens from a bucket of bounded size.
///
/// The bucket starts full. Replenishment is purely additive and capped at
/// `token_limit`, independent of consumption timing. With
/// `auto_replenishment` enabled a background timer adds
/// `tokens_per_period` each period; otherwise refills happen only through
/// [`TokenBucketLimiter::try_replenish`]. Both paths share the same
/// internal refill operation.
pub struct TokenBucketLimiter {
    core: Arc<Core<TokenBucketState>>,
    replenisher: Option<Replenisher>,
}

impl TokenBucketLimiter {
    /// Create a limiter from its configuration, starting the refill timer
    /// when auto-replenishment is enabled.
    ///
    /// Must be called from within a tokio runtime when auto-replenishment
    /// is enabled.
    pub fn new(config: &TokenBucketConfig) -> Result<Self> {
        config.validate()?;
        let core = Core::new(
            TokenBucketState {
                ledger: PermitLedger::new(config.token_limit),
                tokens_per_period: config.tokens_per_period,
            },
            config.queue_limit,
            config.queue_order,
        );
        let replenisher = config.auto_replenishment.then(|| {
            Replenisher::spawn(Arc::downgrade(&core), config.replenishment_period())
        });
        Ok(Self { core, replenisher })
    }

    /// Attempt to acquire `permits` tokens without suspending.
    pub fn try_acquire(&self, permits: u32) -> Lease {
        self.core.try_acquire(permits)
    }

    /// Acquire `permits` tokens, suspending in the wait queue if necessary.
    pub async fn acquire(&self, permits: u32) -> Lease {
        self.core.acquire(permits).await
    }

    /// Apply one manual refill.
    ///
    /// Returns `false` without refilling when auto-replenishment owns the
    /// schedule or the limiter has been shut down; returns `true` after
    /// adding `tokens_per_period` tokens (capped at the limit) and
    /// draining the wait queue.
    pub fn try_replenish(&self) -> bool {
        if self.replenisher.is_some() {
            return false;
        }
        self.core.replenish()
    }

    /// Tokens currently available.
    pub fn available_tokens(&self) -> u32 {
        self.core.available()
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        self.core.queued_count()
    }

    /// Stop the refill timer (if any) and reject all queued acquisitions.
    pub fn shutdown(&self) {
        if let Some(ref replenisher) = self.replenisher {
            replenisher.shutdown();
        }
        self.core.close();
    }
}
