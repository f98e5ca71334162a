use super::parser::BackupCommand;
use crate::error::CommandError;
use perma_backup::config::CommandConfig;
use perma_backup::Requester;

/// The console always has the owner level
pub const CONSOLE_LEVEL: u8 = 4;

pub fn level_of(requester: &Requester, commands: &CommandConfig) -> u8 {
    match requester {
        Requester::Console => CONSOLE_LEVEL,
        Requester::Player(name) => commands.player_level(name),
    }
}

pub fn check(
    command: &BackupCommand,
    requester: &Requester,
    commands: &CommandConfig,
) -> Result<(), CommandError> {
    let Some(subcommand) = command.subcommand() else {
        return Ok(());
    };

    let required = commands.required_level(subcommand);
    let actual = level_of(requester, commands);
    if actual < required {
        return Err(CommandError::PermissionDenied {
            subcommand: subcommand.to_string(),
            required,
            actual,
        });
    }
    Ok(())
}
