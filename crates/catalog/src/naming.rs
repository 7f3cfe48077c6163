//! Stable, type-prefixed backup names.
//!
//! Sequence numbers come from the `counters` table and are allocated inside
//! the same transaction that inserts the file record.

use rusqlite::{OptionalExtension, Transaction, params};

use crate::error::CatalogError;
use crate::types::FileType;

/// Builds `{PREFIX}_{number:06}{.ext}`, e.g. `VID_000042.mp4`.
///
/// `extension` may be given with or without its leading dot and is
/// lower-cased. An empty extension yields a bare name.
pub fn backup_name(file_type: FileType, number: u64, extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        format!("{}_{number:06}", file_type.prefix())
    } else {
        format!("{}_{number:06}.{ext}", file_type.prefix())
    }
}

/// Takes the next sequence number for `file_type` and bumps the counter.
///
/// The first number handed out for a type is 1.
pub(crate) fn allocate_number(
    tx: &Transaction<'_>,
    file_type: FileType,
) -> Result<u64, CatalogError> {
    let current: Option<i64> = tx
        .query_row(
            "SELECT next_number FROM counters WHERE file_type = ?1",
            params![file_type.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let number = match current {
        Some(n) => {
            tx.execute(
                "UPDATE counters SET next_number = ?1 WHERE file_type = ?2",
                params![n + 1, file_type.as_str()],
            )?;
            n as u64
        }
        None => {
            tx.execute(
                "INSERT INTO counters (file_type, next_number) VALUES (?1, 2)",
                params![file_type.as_str()],
            )?;
            1
        }
    };

    Ok(number)
}
