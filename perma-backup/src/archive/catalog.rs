//! Listing and deleting archives in the backup root.
//!
//! The directory listing is the catalog: there is no index file. Records are
//! always ordered newest first, and the 1-based position in that order is the
//! number users pass to delete.

use super::ARCHIVE_EXTENSION;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Records shown when no count is given
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// An archive file as seen in the backup root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// File name without the extension
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Local>,
}

impl ArchiveRecord {
    fn from_path(path: PathBuf) -> std::io::Result<Option<Self>> {
        let Some(name) = archive_name(&path) else {
            return Ok(None);
        };

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            // Deleted between the directory read and the stat
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            name,
            size_bytes: metadata.len(),
            modified_at: DateTime::<Local>::from(metadata.modified()?),
            path,
        }))
    }
}

fn archive_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(ARCHIVE_EXTENSION)?.strip_suffix('.')?;
    Some(stem.to_string())
}

/// How many records a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListLimit {
    All,
    Count(usize),
}

impl Default for ListLimit {
    fn default() -> Self {
        ListLimit::Count(DEFAULT_LIST_LIMIT)
    }
}

/// A record together with its 1-based display number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub index: usize,
    pub record: ArchiveRecord,
}

/// One bounded listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Number of archives in the root, regardless of the limit
    pub total: usize,
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct ArchiveCatalog {
    root: PathBuf,
}

impl ArchiveCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All archives, newest first
    pub fn list(&self) -> Result<Vec<ArchiveRecord>> {
        fs::create_dir_all(&self.root)?;

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(record) = ArchiveRecord::from_path(entry.path())? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(records)
    }

    /// The first `limit` archives, newest first, numbered from 1
    pub fn page(&self, limit: ListLimit) -> Result<CatalogPage> {
        let records = self.list()?;
        let total = records.len();
        let shown = match limit {
            ListLimit::All => total,
            ListLimit::Count(count) => count.min(total),
        };

        let entries = records
            .into_iter()
            .take(shown)
            .enumerate()
            .map(|(i, record)| CatalogEntry {
                index: i + 1,
                record,
            })
            .collect();

        Ok(CatalogPage { total, entries })
    }

    /// Delete the archive at 1-based `index` of the current listing
    pub fn delete(&self, index: usize) -> Result<ArchiveRecord> {
        let mut records = self.list()?;
        let count = records.len();
        if index == 0 || index > count {
            return Err(BackupError::IndexOutOfRange { index, count });
        }

        let record = records.swap_remove(index - 1);
        fs::remove_file(&record.path).map_err(|source| BackupError::Delete {
            path: record.path.clone(),
            source,
        })?;

        info!("Deleted archive {}", record.path.display());
        Ok(record)
    }
}
