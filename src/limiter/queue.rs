//! Bounded wait queue for acquisitions that could not be satisfied
//! immediately.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::oneshot;

use super::lease::Lease;

/// Order in which queued acquisitions are granted as capacity frees up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrder {
    /// Pure FIFO: the longest-waiting request is granted first.
    #[default]
    OldestFirst,
    /// LIFO-like: the most recently arrived request is granted first,
    /// bounding latency for fresh requests at the cost of older ones.
    NewestFirst,
}

/// A suspended acquisition waiting for capacity.
///
/// The oneshot sender is the request's single-assignment result slot: it is
/// resolved exactly once, by a drain grant, by queue-limit rejection, or by
/// limiter shutdown.
pub(crate) struct Waiter {
    id: u64,
    permits: u32,
    enqueued_at: Instant,
    tx: oneshot::Sender<Lease>,
}

impl Waiter {
    /// Requested permit count.
    pub fn permits(&self) -> u32 {
        self.permits
    }

    /// How long this waiter has been queued.
    pub fn queued_for(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }

    /// Resolve the waiter with `lease`. Fails if the waiting side gave up.
    pub fn resolve(self, lease: Lease) -> Result<(), Lease> {
        self.tx.send(lease)
    }
}

/// An ordered queue of pending acquisitions.
///
/// The queue itself does not enforce the capacity ceiling; the limiter core
/// checks the configured `queue_limit` before inserting, under the same
/// lock that guards the ledger.
pub(crate) struct WaitQueue {
    entries: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Number of queued waiters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert a waiter per the queue order and return its id.
    ///
    /// `OldestFirst` appends at the tail; `NewestFirst` inserts at the
    /// head. Draining always pops from the head.
    pub fn enqueue(&mut self, permits: u32, tx: oneshot::Sender<Lease>, order: QueueOrder) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let waiter = Waiter {
            id,
            permits,
            enqueued_at: Instant::now(),
            tx,
        };

        match order {
            QueueOrder::OldestFirst => self.entries.push_back(waiter),
            QueueOrder::NewestFirst => self.entries.push_front(waiter),
        }
        id
    }

    /// Permit count requested by the head waiter, if any.
    ///
    /// Drains peek here and stop on an oversized head-of-line request
    /// rather than reordering past it.
    pub fn peek_permits(&self) -> Option<u32> {
        self.entries.front().map(|w| w.permits)
    }

    /// Remove and return the head waiter.
    pub fn pop(&mut self) -> Option<Waiter> {
        self.entries.pop_front()
    }

    /// Remove the waiter with the given id (cancellation path).
    pub fn remove(&mut self, id: u64) -> Option<Waiter> {
        let pos = self.entries.iter().position(|w| w.id == id)?;
        self.entries.remove(pos)
    }

    /// Remove every waiter (shutdown path).
    pub fn drain_all(&mut self) -> impl Iterator<Item = Waiter> + '_ {
        self.entries.drain(..)
    }
}
