use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default chunk size: 5 MiB.
///
/// Files strictly smaller than this are uploaded in a single request.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Media category of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
}

impl FileType {
    /// All types, in display order.
    pub const ALL: [FileType; 4] = [
        FileType::Image,
        FileType::Video,
        FileType::Audio,
        FileType::Document,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Document => "document",
        }
    }

    /// Prefix used in backup names (`IMG_000001.jpg`).
    pub fn prefix(self) -> &'static str {
        match self {
            FileType::Image => "IMG",
            FileType::Video => "VID",
            FileType::Audio => "AUD",
            FileType::Document => "DOC",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "audio" => Ok(FileType::Audio),
            "document" => Ok(FileType::Document),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

/// Upload lifecycle of a tracked file.
///
/// ```text
/// pending ──> uploading ──> complete
///    ^            │
///    └────────────┤
///                 └──────> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Complete,
    Failed,
}

impl FileStatus {
    pub const ALL: [FileStatus; 4] = [
        FileStatus::Pending,
        FileStatus::Uploading,
        FileStatus::Complete,
        FileStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploading => "uploading",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
        }
    }

    /// Returns `true` if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Uploading)
                | (FileStatus::Uploading, FileStatus::Complete)
                | (FileStatus::Uploading, FileStatus::Pending)
                | (FileStatus::Uploading, FileStatus::Failed)
        )
    }

    /// `complete` and `failed` are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Complete | FileStatus::Failed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "uploading" => Ok(FileStatus::Uploading),
            "complete" => Ok(FileStatus::Complete),
            "failed" => Ok(FileStatus::Failed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Whole-file vs. chunked decision, fixed when a file is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_size: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Creates a policy; a zero `chunk_size` falls back to [`DEFAULT_CHUNK_SIZE`].
    pub fn new(chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self { chunk_size }
    }

    /// Number of chunks for a file of `size` bytes, or `None` for a
    /// whole-file upload.
    pub fn chunks_for(&self, size: u64) -> Option<u64> {
        if size < self.chunk_size {
            None
        } else {
            Some(size.div_ceil(self.chunk_size))
        }
    }
}

/// One tracked source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the backup root, `/`-separated.
    pub path: String,
    pub backup_name: String,
    pub file_type: FileType,
    /// Size in bytes at discovery time.
    pub size: u64,
    pub status: FileStatus,
    /// `None` for whole-file uploads.
    pub chunks_total: Option<u64>,
    /// Chunks acknowledged by the remote (watermark).
    pub chunks_uploaded: u64,
    pub discovered_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Chunks still to send, in order.
    pub fn remaining_chunks(&self) -> std::ops::Range<u64> {
        match self.chunks_total {
            Some(total) => self.chunks_uploaded..total,
            None => 0..0,
        }
    }
}

/// Count and byte total of a group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub count: u64,
    pub size: u64,
}

/// Read-only aggregation over the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub by_type: BTreeMap<FileType, Aggregate>,
    pub by_status: BTreeMap<FileStatus, Aggregate>,
}

impl CatalogSummary {
    pub fn total(&self) -> Aggregate {
        self.by_type
            .values()
            .fold(Aggregate::default(), |acc, a| Aggregate {
                count: acc.count + a.count,
                size: acc.size + a.size,
            })
    }

    pub fn status(&self, status: FileStatus) -> Aggregate {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}
