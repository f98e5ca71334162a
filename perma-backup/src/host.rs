//! The game server as seen by the backup core.
//!
//! The host owns the live world directory. The core only needs to send it
//! console commands and to talk to whoever asked for a backup.

use crate::utils::errors::HostError;
use std::fmt;
use std::sync::Arc;

/// Prefix on every line the core sends to players or the console
pub const MESSAGE_PREFIX: &str = "[PermaBackup] ";

/// Console commands issued around a snapshot
pub mod commands {
    pub const SAVE_OFF: &str = "save-off";
    pub const SAVE_ALL_FLUSH: &str = "save-all flush";
    pub const SAVE_ON: &str = "save-on";
}

/// Who issued a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requester {
    Console,
    Player(String),
}

impl Requester {
    pub fn is_player(&self) -> bool {
        matches!(self, Requester::Player(_))
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requester::Console => f.write_str("console"),
            Requester::Player(name) => f.write_str(name),
        }
    }
}

pub trait Host: Send + Sync {
    /// Run a server console command
    fn execute(&self, command: &str) -> Result<(), HostError>;

    /// Send a message to one requester
    fn reply(&self, to: &Requester, message: &str);

    /// Send a message to every player and the console
    fn broadcast(&self, message: &str);
}

/// Sends prefixed messages on behalf of one requester
#[derive(Clone)]
pub struct Reporter {
    host: Arc<dyn Host>,
    requester: Requester,
}

impl Reporter {
    pub fn new(host: Arc<dyn Host>, requester: Requester) -> Self {
        Self { host, requester }
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Reply privately, one prefixed message per line
    pub fn reply(&self, message: &str) {
        for line in message.lines() {
            self.host.reply(&self.requester, &format!("{MESSAGE_PREFIX}{line}"));
        }
    }

    /// Broadcast when a player asked; a console requester just gets a reply
    pub fn announce(&self, message: &str) {
        if !self.requester.is_player() {
            self.reply(message);
            return;
        }
        for line in message.lines() {
            self.host.broadcast(&format!("{MESSAGE_PREFIX}{line}"));
        }
    }
}
