//! Permanent Backup Library
//!
//! Timestamped zip archives of live game worlds: suspend autosave, flush,
//! copy the worlds aside, resume, compress, clean up. Also lists and deletes
//! the archives already written.

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod fs;
pub mod host;
pub mod utils;

// Re-export commonly used types
pub use archive::catalog::ArchiveCatalog;
pub use config::Config;
pub use coordinator::state::BackupState;
pub use coordinator::{BackupCoordinator, BackupRequest, BackupSettings, RunOutcome};
pub use host::{Host, Reporter, Requester};
pub use utils::errors::{BackupError, HostError, Result};
