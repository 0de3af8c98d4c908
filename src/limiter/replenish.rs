//! Background replenishment timer.

use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use super::core::{Capacity, Core};

/// A periodic timer that restores capacity for one limiter instance.
///
/// The timer is explicitly owned: [`Replenisher::shutdown`] (or dropping
/// the replenisher) signals the task to stop. The task holds only a weak
/// reference to the limiter core, so it also exits once the limiter itself
/// is gone. A missed tick is skipped, not retried: the next scheduled tick
/// applies the normal replenishment amount with no catch-up burst.
pub(crate) struct Replenisher {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Replenisher {
    /// Spawn the timer task. Must be called from within a tokio runtime.
    pub fn spawn<S: Capacity>(core: Weak<Core<S>>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(core) = core.upgrade() else {
                            trace!("Limiter dropped, stopping replenisher");
                            break;
                        };
                        core.replenish();
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Replenisher shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the timer task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the timer task has exited.
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Replenisher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}
