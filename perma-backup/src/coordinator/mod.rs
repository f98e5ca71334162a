//! Backup coordinator - runs one backup from write-suspension to cleanup.
//!
//! A run goes through these phases, in order:
//! - take the run guard (a second concurrent run is rejected, never queued)
//! - `save-off` when configured, then `save-all flush`
//! - wait for the host to acknowledge the save, or give up if unloading
//! - copy the worlds into staging, then `save-on` straight away
//! - compress the staging copy into a new archive, reporting progress
//! - remove the staging copy
//!
//! Whatever happens, autosave is turned back on before the guard is released.

mod autosave;
pub mod state;

use crate::archive::compress::{compress_tree, discard_partial};
use crate::archive::naming::next_archive_path;
use crate::archive::progress::{format_bytes, format_elapsed};
use crate::config::Config;
use crate::fs::snapshot::{copy_subtrees, remove_subtrees};
use crate::fs::walker::WalkOptions;
use crate::host::{commands, Host, Reporter, Requester};
use crate::utils::errors::{BackupError, Result};
use autosave::AutosaveSuspension;
use chrono::{DateTime, Local};
use state::{BackupState, RunPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Lock file the server keeps open inside each world
pub const SESSION_LOCK_FILE: &str = "session.lock";

/// What a run needs from the configuration
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_path: PathBuf,
    pub server_path: PathBuf,
    pub world_names: Vec<String>,
    pub turn_off_auto_save: bool,
    pub ignore_session_lock: bool,
    pub save_poll_interval: Duration,
}

impl BackupSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backup_path: config.backup.backup_path.clone(),
            server_path: config.backup.server_path.clone(),
            world_names: config.backup.world_names.clone(),
            turn_off_auto_save: config.backup.turn_off_auto_save,
            ignore_session_lock: config.backup.ignore_session_lock,
            save_poll_interval: config.daemon.save_poll_interval(),
        }
    }

    fn snapshot_exclusions(&self) -> WalkOptions {
        if self.ignore_session_lock {
            WalkOptions::excluding([SESSION_LOCK_FILE])
        } else {
            WalkOptions::default()
        }
    }
}

/// One trigger of the `make` command
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub requested_at: DateTime<Local>,
    pub comment: Option<String>,
    pub requester: Requester,
}

impl BackupRequest {
    pub fn new(requester: Requester, comment: Option<String>) -> Self {
        Self {
            requested_at: Local::now(),
            comment,
            requester,
        }
    }
}

/// A finished archive
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub archive_path: PathBuf,
    pub archive_name: String,
    pub files: usize,
    pub size_bytes: u64,
    pub elapsed: Duration,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(BackupSummary),
    /// Another run held the guard; nothing was done
    Rejected,
    /// The process started unloading while waiting for the save
    Interrupted,
    Failed(String),
}

/// Files this run has put on disk so far
#[derive(Debug, Default)]
struct RunArtifacts {
    staged: bool,
    /// Set only while the archive is being written
    archive: Option<PathBuf>,
}

pub struct BackupCoordinator {
    settings: BackupSettings,
    host: Arc<dyn Host>,
    state: Arc<BackupState>,
}

impl BackupCoordinator {
    pub fn new(settings: BackupSettings, host: Arc<dyn Host>, state: Arc<BackupState>) -> Self {
        Self {
            settings,
            host,
            state,
        }
    }

    /// Start a run in the background and return immediately
    pub fn trigger(self: &Arc<Self>, request: BackupRequest) -> JoinHandle<RunOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(request).await })
    }

    /// Execute one run to completion
    pub async fn run(&self, request: BackupRequest) -> RunOutcome {
        let reporter = Reporter::new(self.host.clone(), request.requester.clone());

        let Some(guard) = self.state.try_begin_run() else {
            warn!(
                requester = %request.requester,
                phase = %self.state.phase(),
                "Backup rejected: {}",
                BackupError::ConcurrencyConflict
            );
            reporter.reply("A backup is already in progress, please don't repeat the command");
            return RunOutcome::Rejected;
        };

        let span = info_span!("backup_run", run_id = %Uuid::new_v4(), requester = %request.requester);
        let outcome = self.run_guarded(&request, &reporter).instrument(span).await;
        drop(guard);
        outcome
    }

    async fn run_guarded(&self, request: &BackupRequest, reporter: &Reporter) -> RunOutcome {
        info!(comment = ?request.comment, "Backup started");

        let mut autosave = AutosaveSuspension::new(self.host.clone(), self.settings.turn_off_auto_save);
        let mut artifacts = RunArtifacts::default();

        let (outcome, final_phase) = match self
            .execute(request, reporter, &mut autosave, &mut artifacts)
            .await
        {
            Ok(summary) => {
                info!(
                    archive = %summary.archive_path.display(),
                    files = summary.files,
                    bytes = summary.size_bytes,
                    "Backup completed"
                );
                reporter.announce(&format!(
                    "Backup completed in {} s\nTotal size {}",
                    format_elapsed(summary.elapsed),
                    format_bytes(summary.size_bytes)
                ));
                (RunOutcome::Completed(summary), RunPhase::Done)
            }
            Err(BackupError::ShutdownInterrupt) => {
                warn!("Backup interrupted while waiting for the save to finish");
                reporter.announce("Server is shutting down, backup interrupted!");
                (RunOutcome::Interrupted, RunPhase::Interrupted)
            }
            Err(e) => {
                error!(error = %e, "Backup failed");
                self.discard_artifacts(&artifacts).await;
                reporter.announce(&format!("Backup failed: {e}"));
                (RunOutcome::Failed(e.to_string()), RunPhase::Failed)
            }
        };

        if autosave.is_suspended() {
            self.state.set_phase(RunPhase::Resuming);
        }
        autosave.finish();
        self.state.set_phase(final_phase);
        outcome
    }

    async fn execute(
        &self,
        request: &BackupRequest,
        reporter: &Reporter,
        autosave: &mut AutosaveSuspension,
        artifacts: &mut RunArtifacts,
    ) -> Result<BackupSummary> {
        let started = Instant::now();
        reporter.announce("Backing up, please wait...");

        self.state.set_phase(RunPhase::Suspending);
        autosave.suspend()?;

        self.state.set_phase(RunPhase::Flushing);
        self.state.reset_save_acknowledgment();
        self.host
            .execute(commands::SAVE_ALL_FLUSH)
            .map_err(|source| BackupError::Host {
                command: commands::SAVE_ALL_FLUSH.to_string(),
                source,
            })?;
        self.wait_for_save().await?;

        self.state.set_phase(RunPhase::Snapshotting);
        let staging_root = self.settings.backup_path.clone();
        let world_names = self.settings.world_names.clone();
        artifacts.staged = true;
        let snapshot = {
            let source = self.settings.server_path.clone();
            let names = world_names.clone();
            let dest = staging_root.clone();
            let exclusions = self.settings.snapshot_exclusions();
            tokio::task::spawn_blocking(move || {
                copy_subtrees(&source, &names, &dest, |path| exclusions.is_excluded(path))
            })
            .await??
        };
        info!(
            files = snapshot.files,
            bytes = snapshot.bytes,
            skipped = snapshot.skipped,
            "Worlds staged"
        );
        autosave.resume()?;

        self.state.set_phase(RunPhase::Compressing);
        let archive_path = next_archive_path(
            &staging_root,
            &Local::now().naive_local(),
            request.comment.as_deref(),
        );
        let archive_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        reporter.announce(&format!("Creating archive {archive_name}..."));

        artifacts.archive = Some(archive_path.clone());
        let stats = {
            let root = staging_root.clone();
            let names = world_names.clone();
            let path = archive_path.clone();
            let progress = reporter.clone();
            tokio::task::spawn_blocking(move || {
                compress_tree(&root, &names, &path, |p| progress.announce(&p.render()))
            })
            .await??
        };
        // From here on the archive is a finished backup, never a partial one
        artifacts.archive = None;
        let elapsed = started.elapsed();

        self.state.set_phase(RunPhase::Cleaning);
        tokio::task::spawn_blocking(move || remove_subtrees(&staging_root, &world_names)).await??;

        Ok(BackupSummary {
            archive_path,
            archive_name,
            files: stats.files,
            size_bytes: stats.size_bytes,
            elapsed,
        })
    }

    /// Poll until the host acknowledges the save or the process starts unloading
    async fn wait_for_save(&self) -> Result<()> {
        loop {
            tokio::time::sleep(self.settings.save_poll_interval).await;
            if self.state.is_save_acknowledged() {
                return Ok(());
            }
            if self.state.is_unloading() {
                return Err(BackupError::ShutdownInterrupt);
            }
        }
    }

    /// Remove the staging copy and any partial archive of a failed run
    async fn discard_artifacts(&self, artifacts: &RunArtifacts) {
        let staging = artifacts
            .staged
            .then(|| (self.settings.backup_path.clone(), self.settings.world_names.clone()));
        let archive = artifacts.archive.clone();

        let cleanup = tokio::task::spawn_blocking(move || {
            if let Some((root, names)) = staging {
                if let Err(e) = remove_subtrees(&root, &names) {
                    warn!("Failed to remove staging copy: {}", e);
                }
            }
            if let Some(path) = archive {
                if let Err(e) = discard_partial(&path) {
                    warn!("Failed to remove partial archive {}: {}", path.display(), e);
                }
            }
        });

        if let Err(e) = cleanup.await {
            warn!("Cleanup task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use crate::utils::errors::HostError;
    use std::fs::{self, File};
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::ZipArchive;

    struct Fixture {
        _temp: TempDir,
        server: PathBuf,
        backups: PathBuf,
        state: Arc<BackupState>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let server = temp.path().join("server");
            let backups = temp.path().join("perma_backup");
            fs::create_dir_all(server.join("world")).unwrap();
            fs::write(server.join("world/a.txt"), b"hi").unwrap();
            fs::write(server.join("world/session.lock"), b"lock").unwrap();
            Self {
                _temp: temp,
                server,
                backups,
                state: Arc::new(BackupState::new()),
            }
        }

        fn settings(&self, worlds: &[&str], turn_off_auto_save: bool) -> BackupSettings {
            BackupSettings {
                backup_path: self.backups.clone(),
                server_path: self.server.clone(),
                world_names: worlds.iter().map(|w| w.to_string()).collect(),
                turn_off_auto_save,
                ignore_session_lock: true,
                save_poll_interval: Duration::from_millis(1),
            }
        }

        /// Host that acknowledges every `save-all flush`
        fn acking_recorder(&self) -> RecordingHost {
            let state = self.state.clone();
            RecordingHost::with_hook(move |cmd| {
                if cmd == commands::SAVE_ALL_FLUSH {
                    state.acknowledge_save();
                }
                Ok(())
            })
        }

        fn acking_host(&self) -> Arc<RecordingHost> {
            Arc::new(self.acking_recorder())
        }

        fn backup_root_entries(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(&self.backups)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }

        fn coordinator(&self, settings: BackupSettings, host: Arc<RecordingHost>) -> Arc<BackupCoordinator> {
            Arc::new(BackupCoordinator::new(settings, host, self.state.clone()))
        }

        fn archives(&self) -> Vec<PathBuf> {
            let Ok(entries) = fs::read_dir(&self.backups) else {
                return Vec::new();
            };
            let mut archives: Vec<PathBuf> = entries
                .map(|e| e.unwrap().path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "zip"))
                .collect();
            archives.sort();
            archives
        }
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_full_run_archives_world_without_session_lock() {
        let fixture = Fixture::new();
        let host = fixture.acking_host();
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());

        let outcome = coordinator
            .run(BackupRequest::new(Requester::Player("Steve".into()), None))
            .await;

        let RunOutcome::Completed(summary) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(fixture.archives(), vec![summary.archive_path.clone()]);
        assert_eq!(summary.files, 1);
        assert_eq!(entry_names(&summary.archive_path), vec!["world/a.txt"]);

        let mut archive = ZipArchive::new(File::open(&summary.archive_path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("world/a.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hi");

        assert_eq!(host.commands(), vec!["save-off", "save-all flush", "save-on"]);
        assert!(!fixture.backups.join("world").exists());
        assert_eq!(fixture.state.phase(), RunPhase::Done);
        assert!(!fixture.state.is_running());

        let messages = host.messages();
        assert_eq!(messages[0], "[PermaBackup] Backing up, please wait...");
        assert!(messages
            .iter()
            .any(|m| m == &format!("[PermaBackup] Creating archive {}...", summary.archive_name)));
        assert!(messages.iter().any(|m| m == "[PermaBackup] [██████████] 100.0% [1/1]"));
        assert!(messages.iter().any(|m| m.starts_with("[PermaBackup] Backup completed in ")));
    }

    #[tokio::test]
    async fn test_comment_is_part_of_archive_name() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), fixture.acking_host());

        let outcome = coordinator
            .run(BackupRequest::new(Requester::Console, Some("before/update".into())))
            .await;

        let RunOutcome::Completed(summary) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(summary.archive_name.ends_with("_beforeupdate.zip"));
    }

    #[tokio::test]
    async fn test_autosave_untouched_when_not_configured() {
        let fixture = Fixture::new();
        let host = fixture.acking_host();
        let coordinator = fixture.coordinator(fixture.settings(&["world"], false), host.clone());

        let outcome = coordinator.run(BackupRequest::new(Requester::Console, None)).await;

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(host.commands(), vec!["save-all flush"]);
    }

    #[tokio::test]
    async fn test_run_rejected_while_guard_is_held() {
        let fixture = Fixture::new();
        let host = fixture.acking_host();
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());
        let _held = fixture.state.try_begin_run().unwrap();

        let outcome = coordinator.run(BackupRequest::new(Requester::Console, None)).await;

        assert!(matches!(outcome, RunOutcome::Rejected));
        assert!(host.commands().is_empty());
        assert!(!fixture.backups.exists());
        assert_eq!(
            host.messages(),
            vec!["[PermaBackup] A backup is already in progress, please don't repeat the command"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_trigger_rejected_and_unload_interrupts() {
        let fixture = Fixture::new();
        // Never acknowledges the save, so the first run parks in the wait
        let host = Arc::new(RecordingHost::new());
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());

        let first = coordinator.trigger(BackupRequest::new(Requester::Console, None));
        for _ in 0..1000 {
            if fixture.state.phase() == RunPhase::Flushing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(fixture.state.phase(), RunPhase::Flushing);

        let second = coordinator.run(BackupRequest::new(Requester::Console, None)).await;
        assert!(matches!(second, RunOutcome::Rejected));

        fixture.state.mark_unloading();
        let first = first.await.unwrap();

        assert!(matches!(first, RunOutcome::Interrupted));
        assert!(fixture.archives().is_empty());
        assert!(!fixture.backups.join("world").exists());
        assert_eq!(host.commands(), vec!["save-off", "save-all flush", "save-on"]);
        assert_eq!(fixture.state.phase(), RunPhase::Interrupted);
        assert!(!fixture.state.is_running());
    }

    #[tokio::test]
    async fn test_copy_failure_resumes_autosave_and_removes_staging() {
        let fixture = Fixture::new();
        let host = fixture.acking_host();
        let coordinator =
            fixture.coordinator(fixture.settings(&["world", "world_nether"], true), host.clone());

        let outcome = coordinator.run(BackupRequest::new(Requester::Console, None)).await;

        let RunOutcome::Failed(reason) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(reason.contains("world_nether"));
        assert_eq!(host.commands(), vec!["save-off", "save-all flush", "save-on"]);
        assert!(!fixture.backups.join("world").exists());
        assert!(fixture.archives().is_empty());
        assert_eq!(fixture.state.phase(), RunPhase::Failed);
        assert!(host
            .messages()
            .iter()
            .any(|m| m.starts_with("[PermaBackup] Backup failed: ")));
    }

    #[tokio::test]
    async fn test_compress_failure_removes_partial_archive() {
        let fixture = Fixture::new();
        fs::write(fixture.server.join("world/b.txt"), b"second").unwrap();
        let staged_second = fixture.backups.join("world/b.txt");
        // The staged file disappears after the first of two files is archived
        let host = Arc::new(fixture.acking_recorder().on_message(move |message| {
            if message.ends_with("[1/2]") {
                fs::remove_file(&staged_second).unwrap();
            }
        }));
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());

        let outcome = coordinator
            .run(BackupRequest::new(Requester::Player("Steve".into()), None))
            .await;

        let RunOutcome::Failed(reason) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(reason.contains("b.txt"));
        assert!(fixture.backup_root_entries().is_empty());
        assert_eq!(host.commands(), vec!["save-off", "save-all flush", "save-on"]);
        assert_eq!(fixture.state.phase(), RunPhase::Failed);
        assert!(!fixture.state.is_running());
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_finished_archive() {
        let fixture = Fixture::new();
        let staged_world = fixture.backups.join("world");
        // Once the last file is archived the staging copy turns into a plain file
        let host = Arc::new(fixture.acking_recorder().on_message(move |message| {
            if message.ends_with("100.0% [1/1]") {
                fs::remove_dir_all(&staged_world).unwrap();
                fs::write(&staged_world, b"").unwrap();
            }
        }));
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());

        let outcome = coordinator
            .run(BackupRequest::new(Requester::Player("Steve".into()), None))
            .await;

        let RunOutcome::Failed(reason) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(reason.contains("world"));
        let archives = fixture.archives();
        assert_eq!(archives.len(), 1);
        assert_eq!(entry_names(&archives[0]), vec!["world/a.txt"]);
        assert!(!fixture.backup_root_entries().iter().any(|n| n.ends_with(".part")));
        assert_eq!(host.commands(), vec!["save-off", "save-all flush", "save-on"]);
        assert_eq!(fixture.state.phase(), RunPhase::Failed);
    }

    #[tokio::test]
    async fn test_rejected_save_off_fails_without_resume() {
        let fixture = Fixture::new();
        let host = Arc::new(RecordingHost::with_hook(|cmd| {
            if cmd == commands::SAVE_OFF {
                return Err(HostError::Closed);
            }
            Ok(())
        }));
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), host.clone());

        let outcome = coordinator.run(BackupRequest::new(Requester::Console, None)).await;

        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(host.commands(), vec!["save-off"]);
        assert!(!fixture.state.is_running());
    }

    #[tokio::test]
    async fn test_sequential_runs_never_share_a_name() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(fixture.settings(&["world"], true), fixture.acking_host());

        for _ in 0..2 {
            let outcome = coordinator.run(BackupRequest::new(Requester::Console, None)).await;
            assert!(matches!(outcome, RunOutcome::Completed(_)));
        }

        assert_eq!(fixture.archives().len(), 2);
    }
}
