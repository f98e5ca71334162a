//! Parsing of `!!backup` command lines.

use crate::error::CommandError;
use perma_backup::archive::catalog::DEFAULT_LIST_LIMIT;
use std::borrow::Cow;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupCommand {
    Help,
    Make { comment: Option<String> },
    List { count: usize },
    ListAll,
    Delete { index: usize },
}

impl BackupCommand {
    /// Subcommand name used for permission lookup; help is open to everyone
    pub fn subcommand(&self) -> Option<&'static str> {
        match self {
            BackupCommand::Help => None,
            BackupCommand::Make { .. } => Some("make"),
            BackupCommand::List { .. } => Some("list"),
            BackupCommand::ListAll => Some("listall"),
            BackupCommand::Delete { .. } => Some("del"),
        }
    }
}

/// Replace a leading alias token with the command it stands for
pub fn expand_alias<'a>(line: &'a str, aliases: &BTreeMap<String, String>) -> Cow<'a, str> {
    let line = line.trim();
    let (head, rest) = split_token(line);
    match aliases.get(head) {
        Some(target) if rest.is_empty() => Cow::Owned(target.clone()),
        Some(target) => Cow::Owned(format!("{target} {rest}")),
        None => Cow::Borrowed(line),
    }
}

/// Parse one line. `None` means the line is not addressed to `prefix`.
pub fn parse(line: &str, prefix: &str) -> Option<Result<BackupCommand, CommandError>> {
    let (head, rest) = split_token(line.trim());
    if head != prefix {
        return None;
    }
    Some(parse_subcommand(rest))
}

fn parse_subcommand(input: &str) -> Result<BackupCommand, CommandError> {
    let (subcommand, rest) = split_token(input);
    match subcommand {
        "" => Ok(BackupCommand::Help),
        "make" => Ok(BackupCommand::Make {
            comment: (!rest.is_empty()).then(|| rest.to_string()),
        }),
        "list" => {
            let count = match rest {
                "" => DEFAULT_LIST_LIMIT,
                value => parse_number("list", value)?,
            };
            Ok(BackupCommand::List { count })
        }
        "listall" if rest.is_empty() => Ok(BackupCommand::ListAll),
        "listall" => Err(invalid("listall", rest)),
        "del" if rest.is_empty() => Err(CommandError::UnknownCommand("del".to_string())),
        "del" => Ok(BackupCommand::Delete {
            index: parse_number("del", rest)?,
        }),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn parse_number(subcommand: &str, value: &str) -> Result<usize, CommandError> {
    value.parse().map_err(|_| invalid(subcommand, value))
}

fn invalid(subcommand: &str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        subcommand: subcommand.to_string(),
        value: value.to_string(),
    }
}

/// First whitespace-delimited token and the trimmed remainder
fn split_token(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (input, ""),
    }
}
