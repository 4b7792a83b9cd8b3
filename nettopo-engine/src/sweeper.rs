//! Periodic idle eviction.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, warn};

use crate::store::Evicted;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub evicted: Evicted,
    /// Subscribers that accepted the resulting full update.
    pub delivered: usize,
}

impl SweepReport {
    pub fn removed_anything(&self) -> bool {
        !self.evicted.is_empty()
    }
}

/// Shortest period a sweeper runs at.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Run `sweep` every `period` on a background task.
///
/// The first pass happens one period after the call, not immediately.
/// Periods below [`MIN_SWEEP_PERIOD`] are raised to it.
pub fn spawn_sweeper<F>(period: Duration, mut sweep: F) -> SweeperHandle
where
    F: FnMut() + Send + 'static,
{
    if period < MIN_SWEEP_PERIOD {
        warn!(?period, min = ?MIN_SWEEP_PERIOD, "sweep period too short, raising it");
    }
    let period = period.max(MIN_SWEEP_PERIOD);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => sweep(),
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    SweeperHandle { stop_tx, task }
}

/// Handle for the background sweeper.
///
/// Dropping the handle also stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop without waiting for it.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }

    /// Signal the sweeper to stop and wait until its task has exited.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "sweeper task failed");
        }
    }
}
