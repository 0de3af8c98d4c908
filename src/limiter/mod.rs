//! Limiter implementations and the shared acquisition contract.

mod concurrency;
mod core;
mod fixed_window;
mod lease;
mod ledger;
mod queue;
mod replenish;
mod sliding_window;
mod token_bucket;

pub use concurrency::ConcurrencyLimiter;
pub use fixed_window::FixedWindowLimiter;
pub use lease::Lease;
pub use queue::QueueOrder;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use async_trait::async_trait;

use crate::config::LimiterConfig;
use crate::error::Result;

/// The admission decision contract shared by every limiter.
///
/// A request pipeline can hold `Arc<dyn AdmissionControl>` without caring
/// which discipline backs a policy.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Attempt to acquire permits without suspending. Returns an ungranted
    /// lease immediately if the request is not satisfiable and not queued.
    fn try_acquire(&self, permits: u32) -> Lease;

    /// Acquire permits, suspending until granted or rejected. Cancellation
    /// is dropping the future (for example via `tokio::select!`).
    async fn acquire(&self, permits: u32) -> Lease;
}

/// A configured limiter instance, tagged by discipline.
///
/// The four variants share only the acquire contract and have materially
/// different internal state, so they are modeled as a sum type rather than
/// a hierarchy.
pub enum Limiter {
    /// Bounds requests executing at once
    Concurrency(ConcurrencyLimiter),
    /// Bounds requests per fixed window
    FixedWindow(FixedWindowLimiter),
    /// Bounds requests per trailing window
    SlidingWindow(SlidingWindowLimiter),
    /// Spends tokens replenished on a schedule
    TokenBucket(TokenBucketLimiter),
}

impl Limiter {
    /// Build a limiter from its configuration.
    ///
    /// Time-based variants spawn their replenishment timer here, so this
    /// must be called from within a tokio runtime.
    pub fn new(config: &LimiterConfig) -> Result<Self> {
        Ok(match config {
            LimiterConfig::Concurrency(c) => Limiter::Concurrency(ConcurrencyLimiter::new(c)?),
            LimiterConfig::FixedWindow(c) => Limiter::FixedWindow(FixedWindowLimiter::new(c)?),
            LimiterConfig::SlidingWindow(c) => {
                Limiter::SlidingWindow(SlidingWindowLimiter::new(c)?)
            }
            LimiterConfig::TokenBucket(c) => Limiter::TokenBucket(TokenBucketLimiter::new(c)?),
        })
    }

    /// Attempt to acquire `permits` without suspending.
    pub fn try_acquire(&self, permits: u32) -> Lease {
        match self {
            Limiter::Concurrency(l) => l.try_acquire(permits),
            Limiter::FixedWindow(l) => l.try_acquire(permits),
            Limiter::SlidingWindow(l) => l.try_acquire(permits),
            Limiter::TokenBucket(l) => l.try_acquire(permits),
        }
    }

    /// Acquire `permits`, suspending in the wait queue if necessary.
    pub async fn acquire(&self, permits: u32) -> Lease {
        match self {
            Limiter::Concurrency(l) => l.acquire(permits).await,
            Limiter::FixedWindow(l) => l.acquire(permits).await,
            Limiter::SlidingWindow(l) => l.acquire(permits).await,
            Limiter::TokenBucket(l) => l.acquire(permits).await,
        }
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        match self {
            Limiter::Concurrency(l) => l.queued_count(),
            Limiter::FixedWindow(l) => l.queued_count(),
            Limiter::SlidingWindow(l) => l.queued_count(),
            Limiter::TokenBucket(l) => l.queued_count(),
        }
    }

    /// Tear the limiter down: stop any replenishment timer and resolve all
    /// queued acquisitions as ungranted.
    pub fn shutdown(&self) {
        match self {
            Limiter::Concurrency(l) => l.shutdown(),
            Limiter::FixedWindow(l) => l.shutdown(),
            Limiter::SlidingWindow(l) => l.shutdown(),
            Limiter::TokenBucket(l) => l.shutdown(),
        }
    }
}

#[async_trait]
impl AdmissionControl for Limiter {
    fn try_acquire(&self, permits: u32) -> Lease {
        Limiter::try_acquire(self, permits)
    }

    async fn acquire(&self, permits: u32) -> Lease {
        Limiter::acquire(self, permits).await
    }
}

impl From<ConcurrencyLimiter> for Limiter {
    fn from(limiter: ConcurrencyLimiter) -> Self {
        Limiter::Concurrency(limiter)
    }
}

impl From<FixedWindowLimiter> for Limiter {
    fn from(limiter: FixedWindowLimiter) -> Self {
        Limiter::FixedWindow(limiter)
    }
}

impl From<SlidingWindowLimiter> for Limiter {
    fn from(limiter: SlidingWindowLimiter) -> Self {
        Limiter::SlidingWindow(limiter)
    }
}

impl From<TokenBucketLimiter> for Limiter {
    fn from(limiter: TokenBucketLimiter) -> Self {
        Limiter::TokenBucket(limiter)
    }
}
