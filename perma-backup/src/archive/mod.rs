//! Archive files: naming, writing, progress and the on-disk catalog.

pub mod catalog;
pub mod compress;
pub mod naming;
pub mod progress;

use std::path::{Path, PathBuf};

/// Extension of every archive written to the backup root
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Suffix of an archive that is still being written
pub const PARTIAL_SUFFIX: &str = ".part";

/// Where `archive_path` is written before it is complete. The catalog only
/// lists `.zip` files, so an unfinished archive is never listed or deleted.
pub fn partial_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
