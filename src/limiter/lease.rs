//! Lease: the outcome of an acquisition attempt.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives permits back when a granted lease is released.
///
/// Only the concurrency limiter hands out leases wired to a target; window
/// and token-bucket grants model "requests consumed" rather than "resources
/// held" and reclaim capacity purely by time.
pub(crate) trait ReleaseTarget: Send + Sync {
    fn return_permits(&self, permits: u32);
}

/// The outcome of an acquisition attempt.
///
/// A granted lease exclusively owns the consumed capacity until released.
/// [`Lease::release`] is idempotent: the second and later calls are no-ops
/// and never double-credit the ledger. Dropping a lease releases it, so a
/// caller that forgets cleanup cannot leak permits.
pub struct Lease {
    acquired: bool,
    permits: u32,
    target: Option<Arc<dyn ReleaseTarget>>,
    released: AtomicBool,
}

impl Lease {
    /// A rejected (ungranted) lease.
    pub(crate) fn rejected() -> Self {
        Self {
            acquired: false,
            permits: 0,
            target: None,
            released: AtomicBool::new(true),
        }
    }

    /// A granted lease with no release capability (window and token-bucket
    /// algorithms, where capacity is reclaimed only by replenishment).
    pub(crate) fn granted() -> Self {
        Self {
            acquired: true,
            permits: 0,
            target: None,
            released: AtomicBool::new(true),
        }
    }

    /// A granted lease that returns `permits` to `target` when released.
    pub(crate) fn with_release(target: Arc<dyn ReleaseTarget>, permits: u32) -> Self {
        Self {
            acquired: true,
            permits,
            target: Some(target),
            released: AtomicBool::new(false),
        }
    }

    /// Whether the acquisition was granted.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Release the capacity held by this lease.
    ///
    /// Only meaningful for concurrency-limiter leases; for all others this
    /// is a no-op. Safe to call any number of times.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(ref target) = self.target {
            target.return_permits(self.permits);
        }
    }

    /// Mark the lease released without returning permits to the target.
    ///
    /// Used when a granted lease could not be delivered to its waiter and
    /// the drain refunds the capacity inline, under the lock the target
    /// would otherwise re-take.
    pub(crate) fn defuse(&self) {
        self.released.store(true, Ordering::Release);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("acquired", &self.acquired)
            .field("permits", &self.permits)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}
