/// Why a `!!backup` line could not be run
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid argument `{value}` for {subcommand}")]
    InvalidArgument { subcommand: String, value: String },

    #[error("{subcommand} requires level {required}, requester has {actual}")]
    PermissionDenied {
        subcommand: String,
        required: u8,
        actual: u8,
    },
}

impl CommandError {
    /// Text shown to whoever typed the command
    pub fn reply_text(&self, prefix: &str) -> String {
        match self {
            CommandError::UnknownCommand(_) | CommandError::InvalidArgument { .. } => {
                format!("Wrong arguments! Type {prefix} for help")
            }
            CommandError::PermissionDenied { .. } => "Insufficient permission".to_string(),
        }
    }
}
