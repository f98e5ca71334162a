//! The `!!backup` command surface, typed in chat or on the console.

pub mod parser;
pub mod permission;

use crate::state::RunnerState;
use parser::BackupCommand;
use perma_backup::archive::catalog::ListLimit;
use perma_backup::archive::progress::format_bytes;
use perma_backup::{BackupError, BackupRequest, Reporter, Requester};
use tracing::{info, warn};

fn help_text(prefix: &str) -> String {
    format!(
        "------ Permanent Backup ------\n\
         Creates permanent backups of the worlds\n\
         [Commands]\n\
         {prefix} - show this help\n\
         {prefix} make [<comment>] - create a backup with an optional comment\n\
         {prefix} list [<count>] - show the latest backups (10 by default)\n\
         {prefix} listall - show every backup\n\
         {prefix} del <backup_number> - delete the backup with that number"
    )
}

/// Run `line` if it is a backup command. Returns false for any other line.
pub async fn dispatch(state: &RunnerState, requester: Requester, line: &str) -> bool {
    let commands = &state.config.commands;
    let expanded = parser::expand_alias(line, &commands.alias);
    let Some(parsed) = parser::parse(&expanded, &commands.prefix) else {
        return false;
    };

    let command = match parsed.and_then(|command| {
        permission::check(&command, &requester, commands)?;
        Ok(command)
    }) {
        Ok(command) => command,
        Err(e) => {
            info!(requester = %requester, "Command `{}` refused: {}", expanded, e);
            state.host.reply(&requester, &e.reply_text(&commands.prefix));
            return true;
        }
    };

    info!(requester = %requester, "Running `{}`", expanded);
    let reporter = Reporter::new(state.host.clone(), requester.clone());
    match command {
        BackupCommand::Help => {
            for line in help_text(&commands.prefix).lines() {
                state.host.reply(&requester, line);
            }
        }
        BackupCommand::Make { comment } => {
            // The run reports its own outcome
            drop(state.coordinator.trigger(BackupRequest::new(requester, comment)));
        }
        BackupCommand::List { count } => list(state, &reporter, ListLimit::Count(count)).await,
        BackupCommand::ListAll => list(state, &reporter, ListLimit::All).await,
        BackupCommand::Delete { index } => delete(state, &reporter, index).await,
    }
    true
}

async fn list(state: &RunnerState, reporter: &Reporter, limit: ListLimit) {
    let catalog = state.catalog.clone();
    let page = match tokio::task::spawn_blocking(move || catalog.page(limit)).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            warn!("Failed to list backups: {}", e);
            reporter.reply(&format!("Failed to list backups: {e}"));
            return;
        }
        Err(e) => {
            warn!("Listing task failed: {}", e);
            reporter.reply(&format!("Failed to list backups: {e}"));
            return;
        }
    };

    reporter.reply(&format!("There are {} backups", page.total));
    for entry in page.entries {
        state.host.reply(
            reporter.requester(),
            &format!(
                "{}. {} {}",
                entry.index,
                entry.record.name,
                format_bytes(entry.record.size_bytes)
            ),
        );
    }
}

async fn delete(state: &RunnerState, reporter: &Reporter, index: usize) {
    let catalog = state.catalog.clone();
    let result = tokio::task::spawn_blocking(move || catalog.delete(index))
        .await
        .unwrap_or_else(|e| Err(BackupError::Worker(e)));

    match result {
        Ok(record) => reporter.announce(&format!("Deleted backup {}", record.name)),
        Err(BackupError::IndexOutOfRange { index, .. }) => {
            reporter.announce(&format!("Invalid backup number: {index}"))
        }
        Err(e) => {
            warn!("Failed to delete backup {}: {}", index, e);
            reporter.announce(&format!("Failed to delete backup: {e}"));
        }
    }
}
