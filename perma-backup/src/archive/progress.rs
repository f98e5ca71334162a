//! File-count progress for archive creation.
//!
//! Progress is reported as a ten-segment bar, a percentage and a fraction,
//! e.g. `[█████     ] 50.0% [4/8]`. Reports are best effort: they fire every
//! `total / 8` files and always on the last one.

use std::time::Duration;

const BAR_SEGMENTS: usize = 10;
const REPORTS_PER_RUN: usize = 8;

/// Progress of one archive write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveProgress {
    /// Number of files written so far
    pub files_processed: usize,

    /// Total number of files
    pub total_files: usize,
}

impl ArchiveProgress {
    pub fn new(files_processed: usize, total_files: usize) -> Self {
        Self {
            files_processed,
            total_files,
        }
    }

    /// Percentage complete (0-100). An empty archive counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        (self.files_processed as f64 / self.total_files as f64) * 100.0
    }

    /// One-line rendering for chat and console
    pub fn render(&self) -> String {
        let percent = self.percent();
        let filled = ((percent / 10.0) as usize).min(BAR_SEGMENTS);
        format!(
            "[{}{}] {:.1}% [{}/{}]",
            "█".repeat(filled),
            " ".repeat(BAR_SEGMENTS - filled),
            percent,
            self.files_processed,
            self.total_files
        )
    }
}

/// Decides which file counts are worth a progress report
#[derive(Debug, Clone, Copy)]
pub struct ProgressCadence {
    total: usize,
    step: usize,
}

impl ProgressCadence {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            step: (total / REPORTS_PER_RUN).max(1),
        }
    }

    pub fn should_report(&self, processed: usize) -> bool {
        processed == self.total || processed % self.step == 0
    }
}

/// Format bytes as human-readable string (binary units, one decimal)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["bytes", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format an elapsed duration as seconds with one decimal
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_half_way() {
        let progress = ArchiveProgress::new(4, 8);
        assert_eq!(progress.render(), "[█████     ] 50.0% [4/8]");
    }

    #[test]
    fn test_render_complete() {
        let progress = ArchiveProgress::new(3, 3);
        assert_eq!(progress.render(), "[██████████] 100.0% [3/3]");
    }

    #[test]
    fn test_empty_archive_counts_as_done() {
        let progress = ArchiveProgress::new(0, 0);
        assert_eq!(progress.percent(), 100.0);
    }

    #[test]
    fn test_cadence_for_large_totals() {
        let cadence = ProgressCadence::new(100);
        let reported: Vec<usize> = (1..=100).filter(|n| cadence.should_report(*n)).collect();
        assert_eq!(reported, vec![12, 24, 36, 48, 60, 72, 84, 96, 100]);
    }

    #[test]
    fn test_cadence_for_small_totals_reports_every_file() {
        let cadence = ProgressCadence::new(5);
        assert!((1..=5).all(|n| cadence.should_report(n)));
    }

    #[test]
    fn test_cadence_for_zero_total() {
        let cadence = ProgressCadence::new(0);
        assert!(cadence.should_report(0));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 bytes");
        assert_eq!(format_bytes(1023), "1023.0 bytes");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GB");
        assert_eq!(format_bytes(1024u64.pow(5)), "1024.0 TB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(12_345)), "12.3");
        assert_eq!(format_elapsed(Duration::ZERO), "0.0");
    }
}
