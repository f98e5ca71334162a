//! The supervised server as the backup host.
//!
//! Commands are written to the server's stdin. Player replies and broadcasts
//! go out as `tellraw` commands; console replies are printed next to the
//! server output.

use perma_backup::{Host, HostError, Requester};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Target selector for every online player
const ALL_PLAYERS: &str = "@a";

pub struct ServerHost {
    stdin_tx: mpsc::UnboundedSender<String>,
}

impl ServerHost {
    pub fn new(stdin_tx: mpsc::UnboundedSender<String>) -> Self {
        Self { stdin_tx }
    }

    fn send_line(&self, line: String) -> Result<(), HostError> {
        self.stdin_tx.send(line).map_err(|_| HostError::Closed)
    }

    fn tell(&self, target: &str, message: &str) {
        if let Err(e) = self.send_line(tellraw(target, message)) {
            warn!("Could not message {}: {}", target, e);
        }
    }
}

/// `tellraw` command showing `message` to `target`
pub fn tellraw(target: &str, message: &str) -> String {
    format!("tellraw {} {}", target, json!({ "text": message }))
}

impl Host for ServerHost {
    fn execute(&self, command: &str) -> Result<(), HostError> {
        debug!(command, "Sending command to server");
        self.send_line(command.to_string())
    }

    fn reply(&self, to: &Requester, message: &str) {
        match to {
            Requester::Console => println!("{message}"),
            Requester::Player(name) => self.tell(name, message),
        }
    }

    fn broadcast(&self, message: &str) {
        info!("{}", message);
        self.tell(ALL_PLAYERS, message);
    }
}
