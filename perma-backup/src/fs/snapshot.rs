//! Staging copies of live world directories.
//!
//! A snapshot replaces each named subtree under the staging root with a fresh
//! recursive copy of the live one. Nothing is merged: a stale staging copy
//! left behind by an earlier run is removed first.

use crate::utils::errors::{BackupError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Totals for one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

/// Copy `names` from `source_root` into `dest_root`.
///
/// Files for which `exclude` returns true are not copied. The first failure
/// aborts the whole snapshot and names the path that failed; whatever was
/// already copied stays in place for the caller to clean up.
pub fn copy_subtrees<F>(
    source_root: &Path,
    names: &[String],
    dest_root: &Path,
    exclude: F,
) -> Result<SnapshotStats>
where
    F: Fn(&Path) -> bool,
{
    let mut stats = SnapshotStats::default();

    fs::create_dir_all(dest_root).map_err(|e| BackupError::copy(dest_root, e))?;

    for name in names {
        let source = source_root.join(name);
        let dest = dest_root.join(name);

        if dest.is_dir() {
            debug!("Removing stale staging copy {}", dest.display());
            fs::remove_dir_all(&dest).map_err(|e| BackupError::copy(&dest, e))?;
        }

        copy_tree(&source, &dest, &exclude, &mut stats)?;
        debug!("Staged {} -> {}", source.display(), dest.display());
    }

    Ok(stats)
}

fn copy_tree<F>(source: &Path, dest: &Path, exclude: &F, stats: &mut SnapshotStats) -> Result<()>
where
    F: Fn(&Path) -> bool,
{
    let metadata = fs::metadata(source).map_err(|e| BackupError::copy(source, e))?;
    if !metadata.is_dir() {
        return Err(BackupError::copy(
            source,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            BackupError::copy(path, e.into())
        })?;

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| BackupError::copy(&target, e))?;
            continue;
        }

        if exclude(entry.path()) {
            stats.skipped += 1;
            continue;
        }

        if file_type.is_symlink() {
            // Links to files are copied by content, anything else is left out
            match fs::metadata(entry.path()) {
                Ok(resolved) if resolved.is_file() => {}
                _ => {
                    debug!("Skipping link {}", entry.path().display());
                    stats.skipped += 1;
                    continue;
                }
            }
        } else if !file_type.is_file() {
            stats.skipped += 1;
            continue;
        }

        let bytes = fs::copy(entry.path(), &target).map_err(|e| BackupError::copy(entry.path(), e))?;
        stats.files += 1;
        stats.bytes += bytes;
    }

    Ok(())
}

/// Remove the staged copy of each subtree. Missing subtrees are ignored.
pub fn remove_subtrees(dest_root: &Path, names: &[String]) -> Result<()> {
    for name in names {
        let dest = dest_root.join(name);
        match fs::remove_dir_all(&dest) {
            Ok(()) => debug!("Removed staging copy {}", dest.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(BackupError::Delete { path: dest, source }),
        }
    }
    Ok(())
}
