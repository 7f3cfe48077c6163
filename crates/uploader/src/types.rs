//! Data types shared by the scanner and the upload engine.

use std::collections::BTreeMap;

use mediabackup_catalog::FileType;

/// Progress event emitted during an upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Work on a file begins. `position` is 1-based within the run.
    Started {
        position: u64,
        total: u64,
        backup_name: String,
        size: u64,
    },
    /// A chunk was acknowledged and the watermark committed.
    ChunkSent {
        backup_name: String,
        chunk_index: u64,
        chunks_total: u64,
    },
    /// The file reached `complete`.
    Completed { backup_name: String },
    /// The remote refused the file; it is back to `pending` for a later run.
    Rejected { backup_name: String, status: u16 },
    /// The source could not be read as catalogued; the file is `failed`.
    Failed {
        backup_name: String,
        path: String,
        reason: String,
    },
    /// The network is gone; the run stops and the file stays `uploading`.
    ConnectionLost { backup_name: String, error: String },
}

/// Callback invoked for every [`UploadEvent`].
pub type EventCallback = Box<dyn Fn(&UploadEvent) + Send + Sync>;

/// Tally of one [`UploadEngine::run`](crate::UploadEngine::run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files pending or uploading when the run started.
    pub outstanding: u64,
    pub completed: u64,
    /// Rejected by the remote and demoted to `pending`.
    pub requeued: u64,
    pub failed: u64,
    /// The run stopped early on connection loss.
    pub halted: bool,
}

impl RunReport {
    pub fn attempted(&self) -> u64 {
        self.completed + self.requeued + self.failed + u64::from(self.halted)
    }
}

/// Result of [`scan_directory`](crate::scan_directory).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Newly registered files per type.
    pub added: BTreeMap<FileType, u64>,
    /// Supported files that were already tracked.
    pub skipped: u64,
}

impl ScanSummary {
    pub fn total_added(&self) -> u64 {
        self.added.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempted_counts_the_halted_file() {
        let report = RunReport {
            outstanding: 5,
            completed: 2,
            requeued: 1,
            failed: 0,
            halted: true,
        };
        assert_eq!(report.attempted(), 4);
    }

    #[test]
    fn scan_summary_total() {
        let mut summary = ScanSummary::default();
        assert_eq!(summary.total_added(), 0);
        summary.added.insert(FileType::Image, 3);
        summary.added.insert(FileType::Video, 2);
        assert_eq!(summary.total_added(), 5);
    }
}
