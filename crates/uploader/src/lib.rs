//! Resumable upload pipeline for one backup root.
//!
//! # Pipeline
//!
//! 1. **Scan**: walk the backup root and register new media files in the
//!    [`Catalog`](mediabackup_catalog::Catalog).
//! 2. **Upload**: drain the catalog one file at a time, whole or chunked,
//!    resuming interrupted files from their chunk watermark.
//! 3. **Manifest**: push a snapshot of the catalog to the remote.
//!
//! The crate has no UI: progress is reported through [`UploadEvent`]s and the
//! caller decides how to display them.

pub mod engine;
pub mod error;
pub mod manifest;
pub mod scanner;
pub mod types;

pub use engine::UploadEngine;
pub use error::UploadError;
pub use manifest::{MANIFEST_FILE_NAME, sync_manifest};
pub use scanner::{STATE_DIR_NAME, classify, scan_directory};
pub use types::{EventCallback, RunReport, ScanSummary, UploadEvent};
