//! Zip archive creation from a staged tree.

use super::partial_path;
use super::progress::{ArchiveProgress, ProgressCadence};
use crate::fs::walker::{walk_directory, FileInfo, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Result of a finished archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub size_bytes: u64,
}

/// Write every regular file under `staging_root/<name>` for each of `names`
/// into a new deflate-compressed zip at `archive_path`.
///
/// Entries are named `<name>/<relative path>` with `/` separators. All files
/// are counted before the first one is written; `on_progress` then receives
/// `(processed, total)` on the cadence of [`ProgressCadence`] and always for
/// the final file. An empty tree produces a single `(0, 0)` report.
///
/// The archive is written to its [`partial_path`] and renamed to
/// `archive_path` only once it is complete and synced. `archive_path` must
/// not exist yet. A failure part-way leaves the partial file on disk; see
/// [`discard_partial`].
pub fn compress_tree<F>(
    staging_root: &Path,
    names: &[String],
    archive_path: &Path,
    mut on_progress: F,
) -> Result<ArchiveStats>
where
    F: FnMut(ArchiveProgress),
{
    let options = WalkOptions::default();
    let mut entries: Vec<(String, FileInfo)> = Vec::new();
    for name in names {
        let subtree = staging_root.join(name);
        let files = walk_directory(&subtree, &options).map_err(|e| BackupError::compress(&subtree, e))?;
        entries.extend(
            files
                .into_iter()
                .map(|file| (format!("{}/{}", name, file.portable_relative_path()), file)),
        );
    }

    let total = entries.len();
    let cadence = ProgressCadence::new(total);
    debug!("Compressing {} files into {}", total, archive_path.display());

    if archive_path.exists() {
        return Err(BackupError::compress(
            archive_path,
            io::Error::new(io::ErrorKind::AlreadyExists, "archive already exists"),
        ));
    }

    let partial = partial_path(archive_path);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&partial)
        .map_err(|e| BackupError::compress(&partial, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (processed, (entry_name, file)) in entries.into_iter().enumerate() {
        zip.start_file(entry_name.as_str(), file_options)
            .map_err(|e| BackupError::compress(archive_path, e))?;

        let mut source = File::open(&file.path).map_err(|e| BackupError::compress(&file.path, e))?;
        io::copy(&mut source, &mut zip).map_err(|e| BackupError::compress(&file.path, e))?;

        let processed = processed + 1;
        if cadence.should_report(processed) {
            on_progress(ArchiveProgress::new(processed, total));
        }
    }

    if total == 0 {
        on_progress(ArchiveProgress::new(0, 0));
    }

    let writer = zip
        .finish()
        .map_err(|e| BackupError::compress(&partial, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| BackupError::compress(&partial, e.into_error()))?;
    file.sync_all()
        .map_err(|e| BackupError::compress(&partial, e))?;
    let size_bytes = file
        .metadata()
        .map_err(|e| BackupError::compress(&partial, e))?
        .len();
    drop(file);

    fs::rename(&partial, archive_path).map_err(|e| BackupError::compress(archive_path, e))?;

    Ok(ArchiveStats {
        files: total,
        size_bytes,
    })
}

/// Remove the unfinished file of `archive_path`. A missing file is not an error.
pub fn discard_partial(archive_path: &Path) -> io::Result<()> {
    match fs::remove_file(partial_path(archive_path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
