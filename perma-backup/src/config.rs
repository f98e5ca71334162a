//! Configuration management for the backup core and its runner.
//!
//! Loads configuration from a TOML or JSON file (chosen by extension) with
//! environment variable overrides of the form `PERMA_BACKUP__BACKUP__BACKUP_PATH`.
//! A missing file is created with the defaults before loading.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PERMA_BACKUP";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Issue `save-off` for the duration of the copy
    #[serde(default = "default_true")]
    pub turn_off_auto_save: bool,

    /// Leave the server-held `session.lock` out of the snapshot
    #[serde(default = "default_true")]
    pub ignore_session_lock: bool,

    /// Where archives are written; staging copies live here during a run
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Live server directory containing the worlds
    #[serde(default = "default_server_path")]
    pub server_path: PathBuf,

    /// World directories (relative to `server_path`) included in each archive
    #[serde(default = "default_world_names")]
    pub world_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Program and arguments used to start the server, run inside `backup.server_path`
    #[serde(default = "default_server_command")]
    pub command: Vec<String>,

    /// Console content printed by the server once `save-all flush` is done
    #[serde(default = "default_save_complete_marker")]
    pub save_complete_marker: String,

    /// Console command that stops the server
    #[serde(default = "default_stop_command")]
    pub stop_command: String,

    /// Grace period before the server process is killed on shutdown
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command prefix typed in chat or on the console
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Level for players missing from `player_levels`
    /// (0 guest, 1 user, 2 helper, 3 admin, 4 owner)
    #[serde(default = "default_player_level")]
    pub default_player_level: u8,

    /// Minimum level per subcommand
    #[serde(default = "default_permission_levels")]
    pub minimum_permission_level: BTreeMap<String, u8>,

    /// Alias -> command it expands to
    #[serde(default = "default_aliases")]
    pub alias: BTreeMap<String, String>,

    /// Per-player permission levels
    #[serde(default)]
    pub player_levels: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Longest time shutdown waits for a running backup
    #[serde(default = "default_shutdown_wait_secs")]
    pub shutdown_wait_secs: u64,

    /// Poll interval while waiting for the save acknowledgment
    #[serde(default = "default_save_poll_interval_ms")]
    pub save_poll_interval_ms: u64,
}

// Default values
fn default_true() -> bool {
    true
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("./perma_backup")
}

fn default_server_path() -> PathBuf {
    PathBuf::from("./server")
}

fn default_world_names() -> Vec<String> {
    vec!["world".to_string()]
}

fn default_server_command() -> Vec<String> {
    ["java", "-Xms1G", "-Xmx2G", "-jar", "server.jar", "nogui"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_save_complete_marker() -> String {
    "Saved the game".to_string()
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_stop_timeout_secs() -> u64 {
    60
}

fn default_prefix() -> String {
    "!!backup".to_string()
}

fn default_player_level() -> u8 {
    1
}

fn default_permission_levels() -> BTreeMap<String, u8> {
    BTreeMap::from([
        ("make".to_string(), 2),
        ("list".to_string(), 0),
        ("listall".to_string(), 2),
        ("del".to_string(), 3),
    ])
}

fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("!!bk".to_string(), "!!backup".to_string())])
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_wait_secs() -> u64 {
    300
}

fn default_save_poll_interval_ms() -> u64 {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            turn_off_auto_save: true,
            ignore_session_lock: true,
            backup_path: default_backup_path(),
            server_path: default_server_path(),
            world_names: default_world_names(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            save_complete_marker: default_save_complete_marker(),
            stop_command: default_stop_command(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            default_player_level: default_player_level(),
            minimum_permission_level: default_permission_levels(),
            alias: default_aliases(),
            player_levels: BTreeMap::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shutdown_wait_secs: default_shutdown_wait_secs(),
            save_poll_interval_ms: default_save_poll_interval_ms(),
        }
    }
}

impl CommandConfig {
    /// Minimum level for a subcommand; unknown subcommands are open to everyone
    pub fn required_level(&self, subcommand: &str) -> u8 {
        self.minimum_permission_level
            .get(subcommand)
            .copied()
            .unwrap_or(0)
    }

    /// Permission level of a player. Names match case-insensitively.
    pub fn player_level(&self, name: &str) -> u8 {
        self.player_levels
            .iter()
            .find(|(player, _)| player.eq_ignore_ascii_case(name))
            .map(|(_, level)| *level)
            .unwrap_or(self.default_player_level)
    }
}

impl DaemonConfig {
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_wait_secs)
    }

    pub fn save_poll_interval(&self) -> Duration {
        Duration::from_millis(self.save_poll_interval_ms.max(1))
    }
}

impl Config {
    /// Load configuration, writing the defaults first if `path` does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            Self::default().write_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }

        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("backup.world_names")
            .with_list_parse_key("server.command")
            .try_parsing(true);

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.to_path_buf()))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to `path`, as JSON for `.json` files and TOML otherwise
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.backup.world_names.iter().any(|w| w.trim().is_empty()) {
            anyhow::bail!("backup.world_names must not contain empty names");
        }
        if self.server.command.is_empty() {
            anyhow::bail!("server.command must name a program");
        }
        if !self.commands.prefix.starts_with("!!") {
            anyhow::bail!("commands.prefix must start with `!!`");
        }
        Ok(())
    }
}
