use perma_backup::config::Config;
use perma_backup::{ArchiveCatalog, BackupCoordinator, BackupSettings, BackupState, Host};
use std::sync::Arc;

pub struct RunnerState {
    pub config: Config,
    pub host: Arc<dyn Host>,
    pub backup: Arc<BackupState>,
    pub coordinator: Arc<BackupCoordinator>,
    pub catalog: ArchiveCatalog,
}

impl RunnerState {
    pub fn new(config: Config, host: Arc<dyn Host>, backup: Arc<BackupState>) -> Self {
        let coordinator = Arc::new(BackupCoordinator::new(
            BackupSettings::from_config(&config),
            host.clone(),
            backup.clone(),
        ));
        let catalog = ArchiveCatalog::new(config.backup.backup_path.clone());
        Self {
            config,
            host,
            backup,
            coordinator,
            catalog,
        }
    }
}
