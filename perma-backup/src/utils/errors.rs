//! Error types for the backup core.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the host when it cannot take a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("server console is closed")]
    Closed,

    #[error("server rejected the command: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("A backup is already in progress")]
    ConcurrencyConflict,

    #[error("Host command `{command}` failed: {source}")]
    Host {
        command: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to copy {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive {}: {source}", path.display())]
    Compress {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Backup interrupted: the process is unloading")]
    ShutdownInterrupt,

    #[error("Invalid backup number {index} (there are {count} backups)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl BackupError {
    pub(crate) fn copy(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Copy {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn compress(path: impl Into<PathBuf>, source: impl Into<zip::result::ZipError>) -> Self {
        BackupError::Compress {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_error_names_path() {
        let err = BackupError::copy(
            "/srv/world/region/r.0.0.mca",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/srv/world/region/r.0.0.mca"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_index_out_of_range_message() {
        let err = BackupError::IndexOutOfRange { index: 4, count: 3 };
        assert_eq!(err.to_string(), "Invalid backup number 4 (there are 3 backups)");
    }
}
