//! Durable catalog of discovered media files and their upload progress.
//!
//! One SQLite database per backup root holds three tables:
//!
//! - `files`: one row per tracked source file, keyed by its path relative
//!   to the backup root.
//! - `counters`: the next sequence number per file type, used to build
//!   stable backup names.
//! - `meta`: free-form key/value pairs recorded at initialisation.
//!
//! Every mutation is its own transaction, so a crash never leaves a
//! half-registered file or a counter bump without its record.

mod catalog;
mod error;
mod naming;
mod types;

pub use catalog::{Catalog, Registration};
pub use error::CatalogError;
pub use naming::backup_name;
pub use types::{
    Aggregate, CatalogSummary, ChunkPolicy, DEFAULT_CHUNK_SIZE, FileRecord, FileStatus, FileType,
};
