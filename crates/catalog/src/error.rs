//! Catalog error types.

use crate::types::FileStatus;

/// Errors produced by the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not tracked: {0}")]
    NotTracked(String),

    #[error("illegal status transition for {path}: {from} -> {to}")]
    IllegalTransition {
        path: String,
        from: FileStatus,
        to: FileStatus,
    },

    #[error("chunk {chunk_index} out of order for {path} (expected {expected})")]
    ChunkOutOfOrder {
        path: String,
        chunk_index: u64,
        expected: u64,
    },

    #[error("file is not chunked: {0}")]
    NotChunked(String),

    #[error("{path} is {status}, not uploading")]
    NotUploading { path: String, status: FileStatus },

    #[error("{path} has {chunks_uploaded}/{chunks_total} chunks acknowledged")]
    Incomplete {
        path: String,
        chunks_uploaded: u64,
        chunks_total: u64,
    },

    #[error("corrupt catalog row: {0}")]
    Corrupt(String),

    #[error("catalog has no backing file")]
    InMemory,
}
