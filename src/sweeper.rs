// src/sweeper.rs

use crate::key_manager::KeyManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task that periodically expires old blacklist entries.
///
/// Owned by whoever starts it. Call [`shutdown`](Self::shutdown) to stop it
/// and wait for the task; dropping the handle only cancels it.
#[derive(Debug)]
pub struct BlacklistSweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BlacklistSweeper {
    /// Spawn the sweep loop. The first sweep runs one full `period` after start.
    pub fn start(key_manager: Arc<KeyManager>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            timer.tick().await;

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!("Blacklist sweeper cancelled");
                        break;
                    }
                    _ = timer.tick() => {
                        let restored = key_manager.sweep_expired();
                        debug!(restored, "Blacklist sweep completed");
                    }
                }
            }
        });

        info!(period_secs = period.as_secs(), "Blacklist sweeper started");
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = ?e, "Blacklist sweeper task ended abnormally");
            }
        }
        info!("Blacklist sweeper stopped");
    }
}

impl Drop for BlacklistSweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
