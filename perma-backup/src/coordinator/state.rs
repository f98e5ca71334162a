//! Process-wide run state shared by the coordinator, the host event handler
//! and shutdown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

static GLOBAL_STATE: OnceLock<Arc<BackupState>> = OnceLock::new();

/// Where the current (or last) run is
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle = 0,
    Suspending,
    Flushing,
    Snapshotting,
    Compressing,
    Cleaning,
    Resuming,
    Done,
    Interrupted,
    Failed,
}

impl RunPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunPhase::Suspending,
            2 => RunPhase::Flushing,
            3 => RunPhase::Snapshotting,
            4 => RunPhase::Compressing,
            5 => RunPhase::Cleaning,
            6 => RunPhase::Resuming,
            7 => RunPhase::Done,
            8 => RunPhase::Interrupted,
            9 => RunPhase::Failed,
            _ => RunPhase::Idle,
        }
    }

    /// True while a run holds the guard
    pub fn is_active(self) -> bool {
        !matches!(
            self,
            RunPhase::Idle | RunPhase::Done | RunPhase::Interrupted | RunPhase::Failed
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Suspending => "suspending",
            RunPhase::Flushing => "flushing",
            RunPhase::Snapshotting => "snapshotting",
            RunPhase::Compressing => "compressing",
            RunPhase::Cleaning => "cleaning",
            RunPhase::Resuming => "resuming",
            RunPhase::Done => "done",
            RunPhase::Interrupted => "interrupted",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Held for the whole of one run
#[derive(Debug)]
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Run guard plus the flags set by asynchronous events
#[derive(Debug)]
pub struct BackupState {
    run_guard: Arc<Mutex<()>>,
    phase: AtomicU8,
    save_acknowledged: AtomicBool,
    unloading: AtomicBool,
}

impl BackupState {
    pub fn new() -> Self {
        Self {
            run_guard: Arc::new(Mutex::new(())),
            phase: AtomicU8::new(RunPhase::Idle as u8),
            save_acknowledged: AtomicBool::new(false),
            unloading: AtomicBool::new(false),
        }
    }

    /// The process-wide instance, created on first use. Coordinators built
    /// later share its guard, so a replaced coordinator cannot start a
    /// second concurrent run.
    pub fn global() -> Arc<Self> {
        GLOBAL_STATE
            .get_or_init(|| Arc::new(Self::new()))
            .clone()
    }

    /// Take the run guard without waiting
    pub fn try_begin_run(&self) -> Option<RunGuard> {
        self.run_guard
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunGuard { _guard: guard })
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Wait at most `ceiling` for the guard to be free. Returns whether it was.
    pub async fn wait_until_idle(&self, ceiling: Duration) -> bool {
        tokio::time::timeout(ceiling, self.run_guard.lock())
            .await
            .is_ok()
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: RunPhase) {
        debug!(%phase, "Run phase");
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn acknowledge_save(&self) {
        self.save_acknowledged.store(true, Ordering::Release);
    }

    pub fn is_save_acknowledged(&self) -> bool {
        self.save_acknowledged.load(Ordering::Acquire)
    }

    pub(crate) fn reset_save_acknowledgment(&self) {
        self.save_acknowledged.store(false, Ordering::Release);
    }

    /// Feed one line of server output (without the log prefix). Returns true
    /// when it was the save-complete marker.
    pub fn observe_server_output(&self, content: &str, marker: &str) -> bool {
        if content.trim_end() == marker {
            self.acknowledge_save();
            return true;
        }
        false
    }

    /// Ask any run waiting for a save acknowledgment to give up
    pub fn mark_unloading(&self) {
        self.unloading.store(true, Ordering::Release);
    }

    pub fn clear_unloading(&self) {
        self.unloading.store(false, Ordering::Release);
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }
}

impl Default for BackupState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_is_exclusive() {
        let state = BackupState::new();

        let guard = state.try_begin_run();
        assert!(guard.is_some());
        assert!(state.is_running());
        assert!(state.try_begin_run().is_none());

        drop(guard);
        assert!(!state.is_running());
        assert!(state.try_begin_run().is_some());
    }

    #[test]
    fn test_global_state_is_shared() {
        let a = BackupState::global();
        let b = BackupState::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_save_marker_sets_acknowledgment() {
        let state = BackupState::new();

        assert!(!state.observe_server_output("Saving the game (this may take a moment!)", "Saved the game"));
        assert!(!state.is_save_acknowledged());

        assert!(state.observe_server_output("Saved the game", "Saved the game"));
        assert!(state.is_save_acknowledged());

        state.reset_save_acknowledgment();
        assert!(!state.is_save_acknowledged());
    }

    #[test]
    fn test_phase_round_trip() {
        let state = BackupState::new();
        assert_eq!(state.phase(), RunPhase::Idle);

        for phase in [
            RunPhase::Suspending,
            RunPhase::Flushing,
            RunPhase::Snapshotting,
            RunPhase::Compressing,
            RunPhase::Cleaning,
            RunPhase::Resuming,
            RunPhase::Done,
            RunPhase::Interrupted,
            RunPhase::Failed,
        ] {
            state.set_phase(phase);
            assert_eq!(state.phase(), phase);
        }
        assert!(RunPhase::Compressing.is_active());
        assert!(!RunPhase::Failed.is_active());
    }

    #[tokio::test]
    async fn test_wait_until_idle() {
        let state = Arc::new(BackupState::new());
        assert!(state.wait_until_idle(Duration::from_millis(10)).await);

        let guard = state.try_begin_run();
        assert!(!state.wait_until_idle(Duration::from_millis(20)).await);

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(state.wait_until_idle(Duration::from_secs(5)).await);
        releaser.await.unwrap();
    }
}
