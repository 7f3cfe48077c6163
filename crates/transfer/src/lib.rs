//! HTTP transport for the backup API.
//!
//! - [`HttpTransport`] performs a single multipart POST.
//! - [`RetryingClient`] wraps any [`Transport`] in the fixed retry ladder.
//! - [`ChunkReader`] slices a source file into fixed-size chunks for resume.

mod chunked;
mod client;
mod retry;
mod types;
mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chunked::ChunkReader;
pub use client::{BoxFuture, HttpTransport, Transport};
pub use retry::{DEFAULT_RETRY_DELAYS, RetryPolicy, RetryingClient, Sleeper, TokioSleeper};
pub use types::{Chunk, Delivery, Endpoint, FilePart, MultipartRequest};
pub use validation::{resolve_under, validate_relative_path};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection refused/reset/timed out. Retryable.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl TransferError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransferError::Connection(_))
    }
}
