//! Directory traversal for staged world trees.
//!
//! Walks are depth-first with entries sorted by file name, so the order in
//! which files reach an archive is reproducible across runs and hosts.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Files whose name matches exactly are skipped
    pub exclude_names: Vec<String>,
}

impl WalkOptions {
    /// Options that skip the given file names
    pub fn excluding<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude_names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a file at `path` is excluded by name
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.exclude_names.iter().any(|ex| name == ex.as_str()))
            .unwrap_or(false)
    }
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> Self {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Self {
            path,
            relative_path,
        }
    }

    /// Relative path joined with `/`, independent of the host separator
    pub fn portable_relative_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walk a directory tree with a callback for each regular file
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(FileInfo) -> std::io::Result<()>,
{
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        if options.is_excluded(entry.path()) {
            continue;
        }

        callback(FileInfo::from_entry(&entry, root))?;
    }

    Ok(())
}

/// Walk a directory tree and collect all regular files
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    walk_directory_with_callback(root, options, |file| {
        files.push(file);
        Ok(())
    })?;
    Ok(files)
}
