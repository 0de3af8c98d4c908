//! Shared acquisition engine behind every limiter variant.
//!
//! A [`Core`] couples one variant's capacity state with a wait queue behind
//! a single mutex, so that a capacity release or replenishment event and a
//! concurrent new-arrival enqueue can never both observe stale state: an
//! arrival either joins the queue before a drain completes or sees the
//! freed capacity directly.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::lease::{Lease, ReleaseTarget};
use super::queue::{QueueOrder, WaitQueue};

/// Variant-specific capacity state plugged into a [`Core`].
///
/// All methods run under the core mutex.
pub(crate) trait Capacity: Send + 'static {
    /// Whether granted leases return their permits on release. True only
    /// for the concurrency limiter; window and token-bucket capacity is
    /// reclaimed by replenishment alone.
    const RETURNS_PERMITS: bool = false;

    /// Attempt to consume `permits`; no side effect on failure.
    fn try_consume(&mut self, permits: u32) -> bool;

    /// Undo a consume that never took effect (release path, or a grant
    /// whose waiter vanished before delivery).
    fn refund(&mut self, permits: u32);

    /// Apply one replenishment step (window rollover or token refill).
    fn replenish(&mut self) {}

    /// The largest request this capacity could ever satisfy.
    fn limit(&self) -> u32;

    /// Capacity available right now.
    fn available(&self) -> u32;
}

pub(crate) struct CoreState<S> {
    capacity: S,
    queue: WaitQueue,
    closed: bool,
}

/// Ledger + queue + queue policy for one limiter instance.
pub(crate) struct Core<S> {
    state: Mutex<CoreState<S>>,
    queue_limit: usize,
    order: QueueOrder,
    /// Self-reference handed to permit-returning leases.
    handle: Weak<Core<S>>,
}

impl<S: Capacity> Core<S> {
    pub fn new(capacity: S, queue_limit: usize, order: QueueOrder) -> Arc<Self> {
        Arc::new_cyclic(|handle| Self {
            state: Mutex::new(CoreState {
                capacity,
                queue: WaitQueue::new(),
                closed: false,
            }),
            queue_limit,
            order,
            handle: handle.clone(),
        })
    }

    /// Non-blocking acquisition: grant or reject immediately, never queue.
    pub fn try_acquire(&self, permits: u32) -> Lease {
        let mut state = self.state.lock();
        if state.closed {
            return Lease::rejected();
        }
        if state.capacity.try_consume(permits) {
            trace!(permits, available = state.capacity.available(), "Permits granted");
            self.grant(permits)
        } else {
            debug!(permits, available = state.capacity.available(), "Capacity rejection");
            Lease::rejected()
        }
    }

    /// Acquire, suspending in the wait queue when capacity is unavailable
    /// but queuing is permitted.
    ///
    /// Cancellation is dropping the returned future (for example via
    /// `tokio::select!` or `tokio::time::timeout`): the waiter is removed
    /// from the queue without touching the ledger or other waiters.
    pub async fn acquire(&self, permits: u32) -> Lease {
        let (waiter_id, rx) = {
            let mut state = self.state.lock();
            if state.closed {
                return Lease::rejected();
            }
            if state.capacity.try_consume(permits) {
                trace!(permits, available = state.capacity.available(), "Permits granted");
                return self.grant(permits);
            }
            // A request larger than the limit can never be satisfied;
            // queuing it would stall the queue forever.
            if permits > state.capacity.limit() {
                debug!(
                    permits,
                    limit = state.capacity.limit(),
                    "Request exceeds permit limit"
                );
                return Lease::rejected();
            }
            if self.queue_limit == 0 || state.queue.len() >= self.queue_limit {
                debug!(
                    permits,
                    queued = state.queue.len(),
                    queue_limit = self.queue_limit,
                    "Queue-limit rejection"
                );
                return Lease::rejected();
            }

            let (tx, rx) = oneshot::channel();
            let id = state.queue.enqueue(permits, tx, self.order);
            trace!(permits, queued = state.queue.len(), "Acquisition queued");
            (id, rx)
        };

        let guard = DequeueGuard {
            core: self.handle.clone(),
            id: waiter_id,
            armed: true,
        };

        match rx.await {
            Ok(lease) => {
                guard.disarm();
                lease
            }
            // Sender dropped without resolving: treated as rejection.
            Err(_) => {
                guard.disarm();
                Lease::rejected()
            }
        }
    }

    /// Apply one replenishment step, then grant to waiters with the freed
    /// capacity. One critical section: a rollover is always processed
    /// before any acquisition evaluated at the same instant.
    ///
    /// Returns `false` without refilling once the limiter is closed.
    pub fn replenish(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.capacity.replenish();
        trace!(available = state.capacity.available(), "Capacity replenished");
        self.drain_locked(&mut state);
        true
    }

    /// Mark the limiter closed and resolve every queued waiter ungranted.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let mut rejected = 0usize;
        for waiter in state.queue.drain_all() {
            let _ = waiter.resolve(Lease::rejected());
            rejected += 1;
        }
        if rejected > 0 {
            debug!(rejected, "Resolved queued acquisitions as ungranted at shutdown");
        }
    }

    /// Capacity currently available.
    pub fn available(&self) -> u32 {
        self.state.lock().capacity.available()
    }

    /// Number of acquisitions currently queued.
    pub fn queued_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Grant waiters from the head of the queue while capacity lasts.
    ///
    /// Stalls on an oversized head-of-line request rather than reordering
    /// past it.
    fn drain_locked(&self, state: &mut CoreState<S>) {
        loop {
            let permits = match state.queue.peek_permits() {
                Some(p) => p,
                None => break,
            };
            if !state.capacity.try_consume(permits) {
                break;
            }
            let waiter = state.queue.pop().expect("peeked waiter present");
            let waited = waiter.queued_for();
            if let Err(lease) = waiter.resolve(self.grant(permits)) {
                // The waiter gave up while queued; take the capacity back.
                lease.defuse();
                state.capacity.refund(permits);
                trace!(permits, "Waiter gone before grant delivery, capacity refunded");
            } else {
                trace!(permits, waited_ms = waited.as_millis() as u64, "Queued acquisition granted");
            }
        }
    }

    /// Build a granted lease, wiring in the release capability for
    /// permit-returning variants.
    fn grant(&self, permits: u32) -> Lease {
        if S::RETURNS_PERMITS {
            match self.handle.upgrade() {
                Some(core) => Lease::with_release(core, permits),
                None => Lease::granted(),
            }
        } else {
            Lease::granted()
        }
    }

    /// Remove a cancelled waiter from the queue, leaving the ledger and
    /// all other waiters untouched.
    fn cancel_waiter(&self, id: u64) {
        let mut state = self.state.lock();
        if state.queue.remove(id).is_some() {
            debug!(queued = state.queue.len(), "Queued acquisition cancelled");
        }
    }
}

impl<S: Capacity> ReleaseTarget for Core<S> {
    fn return_permits(&self, permits: u32) {
        let mut state = self.state.lock();
        state.capacity.refund(permits);
        trace!(permits, available = state.capacity.available(), "Permits released");
        self.drain_locked(&mut state);
    }
}

/// Removes a waiter from the queue if its `acquire` future is dropped
/// before the result slot resolves.
struct DequeueGuard<S: Capacity> {
    core: Weak<Core<S>>,
    id: u64,
    armed: bool,
}

impl<S: Capacity> DequeueGuard<S> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: Capacity> Drop for DequeueGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            core.cancel_waiter(self.id);
        }
    }
}
