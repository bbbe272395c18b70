//! Periodic removal of stale admission windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::controller::AdmissionController;
use crate::error::{BidgateError, Result};

/// Background task that sweeps an [`AdmissionController`] on a fixed interval.
pub struct Sweeper {
    controller: Arc<AdmissionController>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper for `controller`.
    pub fn new(controller: Arc<AdmissionController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Start sweeping. The first sweep runs one full interval after start.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        info!(interval = ?self.interval, "Starting admission window sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.controller.sweep();
                        debug!(removed, "Admission sweep complete");
                    }
                    _ = &mut stop_rx => {
                        debug!("Admission sweeper received stop signal");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running [`Sweeper`].
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the task, but does not wait for it.
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have exited
            let _ = stop_tx.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| BidgateError::Shutdown(format!("sweeper task failed: {}", e)))?;
        info!("Admission window sweeper stopped");
        Ok(())
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
