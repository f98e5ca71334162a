//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! A running backup gets a bounded amount of time to finish before the
//! process goes down. The wait never cancels the run; a run parked on the
//! save acknowledgment only gives up once the unloading flag is set.

use crate::coordinator::state::BackupState;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    state: Arc<BackupState>,
    ceiling: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator that waits at most `ceiling` for a running backup
    pub fn new(state: Arc<BackupState>, ceiling: Duration) -> Self {
        Self {
            state,
            ceiling,
        }
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }

    /// Wait for a running backup to release its guard.
    ///
    /// Returns `false` when the ceiling passed with the backup still running;
    /// shutdown proceeds either way.
    pub async fn shutdown(&self) -> bool {
        if !self.state.is_running() {
            info!("No backup running, nothing to wait for");
            return true;
        }

        info!(
            phase = %self.state.phase(),
            "Waiting up to {}s for the running backup to finish",
            self.ceiling.as_secs()
        );
        let finished = self.state.wait_until_idle(self.ceiling).await;
        if finished {
            info!("Backup finished, continuing shutdown");
        } else {
            warn!(
                phase = %self.state.phase(),
                "Backup still running after {}s, shutting down anyway",
                self.ceiling.as_secs()
            );
        }
        finished
    }
}
