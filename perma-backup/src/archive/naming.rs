//! Collision-free archive file names.

use super::{partial_path, ARCHIVE_EXTENSION};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Timestamp part of every archive name
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Characters stripped from comments before they become part of a file name
const FORBIDDEN_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '|', '<', '>'];

/// Strip path separators and characters that are invalid in file names.
pub fn sanitize_comment(comment: &str) -> String {
    comment
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Base name (no extension) for an archive taken at `timestamp`
pub fn base_name(timestamp: &NaiveDateTime, comment: Option<&str>) -> String {
    let mut name = timestamp.format(TIMESTAMP_FORMAT).to_string();
    if let Some(comment) = comment.map(sanitize_comment).filter(|c| !c.is_empty()) {
        name.push('_');
        name.push_str(&comment);
    }
    name
}

/// Next free archive path under `root`.
///
/// Tries `<base>.zip`, then `<base>_1.zip`, `<base>_2.zip`, ... against the
/// directory as it is right now. A name whose partial file exists is taken
/// too. Nothing is cached between calls.
pub fn next_archive_path(root: &Path, timestamp: &NaiveDateTime, comment: Option<&str>) -> PathBuf {
    let base = base_name(timestamp, comment);
    let mut candidate = root.join(format!("{base}.{ARCHIVE_EXTENSION}"));
    let mut counter = 0u32;

    while candidate.exists() || partial_path(&candidate).exists() {
        counter += 1;
        candidate = root.join(format!("{base}_{counter}.{ARCHIVE_EXTENSION}"));
    }

    candidate
}
