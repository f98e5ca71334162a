//! Server console output: echo, save acknowledgment and chat commands.

use crate::commands;
use crate::state::RunnerState;
use perma_backup::Requester;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Text after the `[time] [thread/LEVEL]: ` log prefix
pub fn parse_content(line: &str) -> Option<&str> {
    if !line.starts_with('[') {
        return None;
    }
    line.split_once("]: ").map(|(_, content)| content)
}

/// A chat line `<player> message`
#[derive(Debug, PartialEq, Eq)]
pub struct ChatMessage<'a> {
    pub player: &'a str,
    pub message: &'a str,
}

pub fn parse_chat(content: &str) -> Option<ChatMessage<'_>> {
    let rest = content.strip_prefix('<')?;
    let (player, message) = rest.split_once("> ")?;
    if player.is_empty() || player.contains(char::is_whitespace) {
        return None;
    }
    Some(ChatMessage { player, message })
}

/// Handle every server output line until the server closes its streams
pub async fn pump_output(mut lines: mpsc::UnboundedReceiver<String>, state: Arc<RunnerState>) {
    let marker = state.config.server.save_complete_marker.clone();
    while let Some(line) = lines.recv().await {
        println!("{line}");

        let Some(content) = parse_content(&line) else {
            continue;
        };
        if state.backup.observe_server_output(content, &marker) {
            debug!("Save acknowledged by the server");
            continue;
        }
        if let Some(chat) = parse_chat(content) {
            if chat.message.starts_with("!!") {
                let requester = Requester::Player(chat.player.to_string());
                commands::dispatch(&state, requester, chat.message).await;
            }
        }
    }
    debug!("Server output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{tellraw, ServerHost};
    use perma_backup::config::Config;
    use perma_backup::BackupState;

    #[test]
    fn test_parse_content() {
        assert_eq!(
            parse_content("[12:00:00] [Server thread/INFO]: Saved the game"),
            Some("Saved the game")
        );
        assert_eq!(parse_content("Starting minecraft server"), None);
        assert_eq!(parse_content("[12:00:00] no separator"), None);
    }

    #[test]
    fn test_parse_chat() {
        assert_eq!(
            parse_chat("<Steve> !!backup make"),
            Some(ChatMessage {
                player: "Steve",
                message: "!!backup make"
            })
        );
        assert_eq!(parse_chat("Steve joined the game"), None);
        assert_eq!(parse_chat("<> hi"), None);
    }

    #[tokio::test]
    async fn test_pump_acknowledges_save_and_runs_chat_commands() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.backup.backup_path = temp.path().join("perma_backup");

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel();
        let backup = Arc::new(BackupState::new());
        let state = Arc::new(RunnerState::new(
            config,
            Arc::new(ServerHost::new(stdin_tx)),
            backup.clone(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("[12:00:00] [Server thread/INFO]: <Steve> Saved the game".to_string())
            .unwrap();
        tx.send("[12:00:01] [Server thread/INFO]: <Steve> !!backup list".to_string())
            .unwrap();
        tx.send("[12:00:02] [Server thread/INFO]: Saved the game".to_string())
            .unwrap();
        drop(tx);

        pump_output(rx, state).await;

        assert!(backup.is_save_acknowledged());
        assert_eq!(
            stdin_rx.try_recv().unwrap(),
            tellraw("Steve", "[PermaBackup] There are 0 backups")
        );
        assert!(stdin_rx.try_recv().is_err());
    }
}
