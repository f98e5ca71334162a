mod commands;
mod error;
mod host;
mod services;
mod state;

use crate::host::ServerHost;
use crate::services::{console, output, server_process};
use crate::state::RunnerState;
use anyhow::Context;
use clap::Parser;
use perma_backup::config::Config;
use perma_backup::daemon::shutdown::ShutdownCoordinator;
use perma_backup::utils::logger;
use perma_backup::BackupState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs a game server and serves the permanent backup commands
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (TOML, or JSON by extension); created with defaults if missing
    #[arg(long, default_value = "config/PermanentBackup.toml")]
    config: PathBuf,

    /// Log level, overriding the configuration
    #[arg(long)]
    log_level: Option<String>,
}

enum Exit {
    Signal,
    ServerExited(std::io::Result<std::process::ExitStatus>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let level = args.log_level.as_deref().unwrap_or(&config.log.level);
    logger::init(level)?;
    tracing::info!(
        "Starting perma-backup-runner with {} (backups in {})",
        args.config.display(),
        config.backup.backup_path.display()
    );

    let backup = BackupState::global();
    backup.clear_unloading();

    let (mut server, lines) =
        server_process::spawn(&config.server.command, &config.backup.server_path)
            .with_context(|| format!("Failed to start server in {}", config.backup.server_path.display()))?;

    let host = Arc::new(ServerHost::new(server.stdin()));
    let state = Arc::new(RunnerState::new(config.clone(), host, backup.clone()));

    let cancel = CancellationToken::new();
    let pump = tokio::spawn(output::pump_output(lines, state.clone()));
    console::start(state.clone(), cancel.clone());

    let shutdown = ShutdownCoordinator::new(backup.clone(), config.daemon.shutdown_wait());
    let exit = tokio::select! {
        _ = shutdown.wait_for_signal() => Exit::Signal,
        status = server.wait() => Exit::ServerExited(status),
    };

    match exit {
        Exit::Signal => {
            shutdown.shutdown().await;
            backup.mark_unloading();
            let timeout = Duration::from_secs(config.server.stop_timeout_secs);
            if let Err(e) = server.stop(&config.server.stop_command, timeout).await {
                tracing::warn!("Failed to stop server: {}", e);
            }
        }
        Exit::ServerExited(status) => {
            match status {
                Ok(status) => tracing::info!("Server exited with {}", status),
                Err(e) => tracing::warn!("Failed to wait for server: {}", e),
            }
            // No save acknowledgment can arrive any more
            backup.mark_unloading();
            shutdown.shutdown().await;
        }
    }

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), pump).await.is_err() {
        tracing::warn!("Server output did not close in time");
    }

    tracing::info!("Runner stopped");
    Ok(())
}
