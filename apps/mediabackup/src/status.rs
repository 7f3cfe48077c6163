//! Human-readable status and progress output.

use std::fmt::Write;

use mediabackup_catalog::{Aggregate, CatalogSummary, FileRecord, FileStatus, FileType};
use mediabackup_uploader::UploadEvent;
use serde::Serialize;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Formats a byte count as B, KB, MB or GB with one decimal.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        b if b < KIB => format!("{b} B"),
        b if b < MIB => format!("{:.1} KB", b as f64 / KIB as f64),
        b if b < GIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b => format!("{:.1} GB", b as f64 / GIB as f64),
    }
}

/// JSON shape printed by `status --json`.
#[derive(Serialize)]
pub struct StatusReport<'a> {
    pub backup_id: &'a str,
    pub total: Aggregate,
    #[serde(flatten)]
    pub summary: &'a CatalogSummary,
}

impl<'a> StatusReport<'a> {
    pub fn new(backup_id: &'a str, summary: &'a CatalogSummary) -> Self {
        Self {
            backup_id,
            total: summary.total(),
            summary,
        }
    }
}

/// Totals by type, then progress by status.
pub fn render_status(summary: &CatalogSummary) -> String {
    let total = summary.total();
    if total.count == 0 {
        return "No files tracked yet. Run 'mediabackup run' to scan.\n".into();
    }

    let mut out = String::new();
    let _ = writeln!(out, "\nTotal: {} files ({})", total.count, format_size(total.size));
    for file_type in FileType::ALL {
        if let Some(entry) = summary.by_type.get(&file_type) {
            let _ = writeln!(
                out,
                "  - {} {}s ({})",
                entry.count,
                file_type,
                format_size(entry.size)
            );
        }
    }

    let complete = summary.status(FileStatus::Complete);
    let uploading = summary.status(FileStatus::Uploading);
    let pending = summary.status(FileStatus::Pending);
    let failed = summary.status(FileStatus::Failed);

    let _ = writeln!(out, "\nUploaded:  {}", files(complete));
    if uploading.count > 0 {
        let _ = writeln!(out, "In progress: {}", files(uploading));
    }
    let _ = writeln!(out, "Remaining: {}", files(pending));
    if failed.count > 0 {
        let _ = writeln!(out, "Failed:    {}", files(failed));
    }
    out
}

/// Files that will not be retried, one per line.
pub fn render_failed(records: &[FileRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "  ! {} ({})", record.path, record.backup_name);
    }
    out
}

fn files(agg: Aggregate) -> String {
    let noun = if agg.count == 1 { "file" } else { "files" };
    format!("{} {noun} ({})", agg.count, format_size(agg.size))
}

/// One output line per upload event.
pub fn progress_line(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Started {
            position,
            total,
            backup_name,
            size,
        } => format!("[{position}/{total}] {backup_name} ({})", format_size(*size)),
        UploadEvent::ChunkSent {
            chunk_index,
            chunks_total,
            ..
        } => format!("    chunk {}/{chunks_total}", chunk_index + 1),
        UploadEvent::Completed { .. } => "    ✓".into(),
        UploadEvent::Rejected { status, .. } => {
            format!("    upload failed (status {status}), will retry next run")
        }
        UploadEvent::Failed { path, reason, .. } => {
            format!("    {path}: {reason}, skipping")
        }
        UploadEvent::ConnectionLost { error, .. } => {
            format!("    connection lost ({error})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> CatalogSummary {
        let mut s = CatalogSummary::default();
        s.by_type.insert(FileType::Image, Aggregate { count: 2, size: 3 * MIB });
        s.by_type.insert(FileType::Video, Aggregate { count: 1, size: 2 * GIB });
        s.by_status.insert(FileStatus::Complete, Aggregate { count: 1, size: MIB });
        s.by_status.insert(FileStatus::Uploading, Aggregate { count: 1, size: 2 * GIB });
        s.by_status.insert(FileStatus::Pending, Aggregate { count: 1, size: 2 * MIB });
        s
    }

    #[test]
    fn size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * MIB), "5.0 MB");
        assert_eq!(format_size(GIB + GIB / 2), "1.5 GB");
    }

    #[test]
    fn status_lists_types_and_progress() {
        let text = render_status(&summary());
        assert!(text.contains("Total: 3 files (2.0 GB)"));
        assert!(text.contains("  - 2 images (3.0 MB)"));
        assert!(text.contains("  - 1 videos (2.0 GB)"));
        assert!(!text.contains("audios"));
        assert!(text.contains("Uploaded:  1 file (1.0 MB)"));
        assert!(text.contains("In progress: 1 file (2.0 GB)"));
        assert!(text.contains("Remaining: 1 file (2.0 MB)"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn failed_files_listed() {
        let record = FileRecord {
            path: "2024/lost.mov".into(),
            backup_name: "VID_000009.mov".into(),
            file_type: FileType::Video,
            size: 10,
            status: FileStatus::Failed,
            chunks_total: None,
            chunks_uploaded: 0,
            discovered_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            uploaded_at: None,
        };
        assert_eq!(render_failed(&[record]), "  ! 2024/lost.mov (VID_000009.mov)\n");
        assert_eq!(render_failed(&[]), "");
    }

    #[test]
    fn empty_status() {
        let text = render_status(&CatalogSummary::default());
        assert!(text.starts_with("No files tracked yet"));
    }

    #[test]
    fn json_report_shape() {
        let summary = summary();
        let value = serde_json::to_value(StatusReport::new("bkp_12345678", &summary)).unwrap();
        assert_eq!(value["backup_id"], "bkp_12345678");
        assert_eq!(value["total"]["count"], 3);
        assert_eq!(value["by_type"]["image"]["count"], 2);
        assert_eq!(value["by_status"]["uploading"]["size"], 2 * GIB);
    }

    #[test]
    fn progress_lines() {
        let started = UploadEvent::Started {
            position: 2,
            total: 7,
            backup_name: "VID_000004.mp4".into(),
            size: 12 * MIB,
        };
        assert_eq!(progress_line(&started), "[2/7] VID_000004.mp4 (12.0 MB)");

        let chunk = UploadEvent::ChunkSent {
            backup_name: "VID_000004.mp4".into(),
            chunk_index: 0,
            chunks_total: 3,
        };
        assert_eq!(progress_line(&chunk), "    chunk 1/3");

        let rejected = UploadEvent::Rejected {
            backup_name: "VID_000004.mp4".into(),
            status: 413,
        };
        assert!(progress_line(&rejected).contains("status 413"));
    }
}
