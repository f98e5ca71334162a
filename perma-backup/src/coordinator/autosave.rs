//! Write-suspension of the host for the duration of a snapshot.

use crate::host::{commands, Host};
use crate::utils::errors::{BackupError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Tracks whether this run turned the host's autosave off.
///
/// Dropping the value while autosave is still off turns it back on, so every
/// exit from a run (including a panic) leaves the host saving again.
pub(crate) struct AutosaveSuspension {
    host: Arc<dyn Host>,
    enabled: bool,
    suspended: bool,
}

impl AutosaveSuspension {
    pub(crate) fn new(host: Arc<dyn Host>, enabled: bool) -> Self {
        Self {
            host,
            enabled,
            suspended: false,
        }
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Send `save-off` when suspension is configured
    pub(crate) fn suspend(&mut self) -> Result<()> {
        if !self.enabled || self.suspended {
            return Ok(());
        }
        run(self.host.as_ref(), commands::SAVE_OFF)?;
        self.suspended = true;
        Ok(())
    }

    /// Send `save-on` if this run turned autosave off
    pub(crate) fn resume(&mut self) -> Result<()> {
        if !self.suspended {
            return Ok(());
        }
        run(self.host.as_ref(), commands::SAVE_ON)?;
        self.suspended = false;
        Ok(())
    }

    /// Final resume attempt; failures are logged
    pub(crate) fn finish(mut self) {
        if let Err(e) = self.resume() {
            warn!("Failed to turn autosave back on: {}", e);
        }
        // Drop must not try again
        self.suspended = false;
    }
}

impl Drop for AutosaveSuspension {
    fn drop(&mut self) {
        if !self.suspended {
            return;
        }
        match self.host.execute(commands::SAVE_ON) {
            Ok(()) => info!("Autosave turned back on after an aborted run"),
            Err(e) => warn!("Failed to turn autosave back on: {}", e),
        }
    }
}

fn run(host: &dyn Host, command: &str) -> Result<()> {
    host.execute(command).map_err(|source| BackupError::Host {
        command: command.to_string(),
        source,
    })
}
