use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::error::CatalogError;
use crate::naming;
use crate::types::{Aggregate, CatalogSummary, ChunkPolicy, FileRecord, FileStatus, FileType};

const SCHEMA_VERSION: &str = "1";

const SCHEMA: &str = "
PRAGMA synchronous = FULL;

CREATE TABLE IF NOT EXISTS files (
    path            TEXT PRIMARY KEY,
    backup_name     TEXT NOT NULL,
    file_type       TEXT NOT NULL,
    size            INTEGER NOT NULL,
    status          TEXT NOT NULL,
    chunks_total    INTEGER,
    chunks_uploaded INTEGER DEFAULT 0,
    discovered_at   TEXT NOT NULL,
    uploaded_at     TEXT
);

CREATE TABLE IF NOT EXISTS counters (
    file_type   TEXT PRIMARY KEY,
    next_number INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT
);

CREATE INDEX IF NOT EXISTS idx_files_status_size ON files(status, size);
";

const RECORD_COLUMNS: &str = "path, backup_name, file_type, size, status, chunks_total, \
                              chunks_uploaded, discovered_at, uploaded_at";

/// Result of [`Catalog::register_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub backup_name: String,
    /// `false` if the path was already tracked.
    pub created: bool,
}

/// SQLite-backed file catalog for one backup root.
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Opens (or creates) the catalog database at `path`.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Opens a throwaway catalog with no backing file.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self { conn, path })
    }

    /// Path of the backing database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Tracks a newly discovered file.
    ///
    /// Allocates the next sequence number for `file_type`, builds the backup
    /// name and inserts a `pending` record in one transaction. If `path` is
    /// already tracked nothing changes and the existing name is returned.
    pub fn register_if_absent(
        &mut self,
        path: &str,
        file_type: FileType,
        extension: &str,
        size: u64,
        policy: &ChunkPolicy,
    ) -> Result<Registration, CatalogError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT backup_name FROM files WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(backup_name) = existing {
            return Ok(Registration {
                backup_name,
                created: false,
            });
        }

        let number = naming::allocate_number(&tx, file_type)?;
        let backup_name = naming::backup_name(file_type, number, extension);
        let chunks_total = policy.chunks_for(size);

        tx.execute(
            "INSERT INTO files (path, backup_name, file_type, size, status, chunks_total, \
             chunks_uploaded, discovered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                path,
                backup_name,
                file_type.as_str(),
                size as i64,
                FileStatus::Pending.as_str(),
                chunks_total.map(|n| n as i64),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        debug!(path, backup_name = %backup_name, size, ?chunks_total, "registered file");
        Ok(Registration {
            backup_name,
            created: true,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns the record for `path`, if tracked.
    pub fn get(&self, path: &str) -> Result<Option<FileRecord>, CatalogError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM files WHERE path = ?1"),
                params![path],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Next file to act on: an interrupted `uploading` record first, then
    /// the smallest `pending` record (ties broken by path).
    pub fn next_to_upload(&self) -> Result<Option<FileRecord>, CatalogError> {
        self.next_to_upload_excluding(&HashSet::new())
    }

    /// Like [`next_to_upload`](Self::next_to_upload) but ignores paths in `skip`.
    pub fn next_to_upload_excluding(
        &self,
        skip: &HashSet<String>,
    ) -> Result<Option<FileRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM files WHERE status IN ('uploading', 'pending') \
             ORDER BY CASE status WHEN 'uploading' THEN 0 ELSE 1 END, size ASC, path ASC"
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let raw = RawRecord::from_row(row)?;
            if skip.contains(&raw.path) {
                continue;
            }
            return raw.into_record().map(Some);
        }
        Ok(None)
    }

    /// All records with the given status, ordered by path.
    pub fn records_with_status(&self, status: FileStatus) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM files WHERE status = ?1 ORDER BY path"),
            status.as_str(),
        )
    }

    /// All records of the given type, ordered by path.
    pub fn records_of_type(&self, file_type: FileType) -> Result<Vec<FileRecord>, CatalogError> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM files WHERE file_type = ?1 ORDER BY path"),
            file_type.as_str(),
        )
    }

    fn query_records(&self, sql: &str, arg: &str) -> Result<Vec<FileRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params![arg], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Number of records still `pending` or `uploading`.
    pub fn outstanding(&self) -> Result<u64, CatalogError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE status IN ('pending', 'uploading')",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Counts and byte totals grouped by type and by status.
    pub fn summary(&self) -> Result<CatalogSummary, CatalogError> {
        Ok(CatalogSummary {
            by_type: self.aggregate_by::<FileType>("file_type")?,
            by_status: self.aggregate_by::<FileStatus>("status")?,
        })
    }

    fn aggregate_by<K>(&self, column: &str) -> Result<BTreeMap<K, Aggregate>, CatalogError>
    where
        K: FromStr<Err = String> + Ord,
    {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*), COALESCE(SUM(size), 0) FROM files GROUP BY {column}"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = BTreeMap::new();
        for (key, count, size) in rows {
            let key = key.parse::<K>().map_err(CatalogError::Corrupt)?;
            out.insert(
                key,
                Aggregate {
                    count: count as u64,
                    size: size as u64,
                },
            );
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// `pending -> uploading`.
    pub fn mark_uploading(&mut self, path: &str) -> Result<(), CatalogError> {
        self.transition(path, FileStatus::Uploading)
    }

    /// `uploading -> complete`; stamps `uploaded_at`.
    ///
    /// Chunked records must have every chunk acknowledged.
    pub fn mark_complete(&mut self, path: &str) -> Result<(), CatalogError> {
        self.transition(path, FileStatus::Complete)
    }

    /// `uploading -> failed`.
    pub fn mark_failed(&mut self, path: &str) -> Result<(), CatalogError> {
        self.transition(path, FileStatus::Failed)
    }

    /// `uploading -> pending`, after the remote rejected the file.
    pub fn mark_pending(&mut self, path: &str) -> Result<(), CatalogError> {
        self.transition(path, FileStatus::Pending)
    }

    fn transition(&mut self, path: &str, to: FileStatus) -> Result<(), CatalogError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let state = load_progress(&tx, path)?;

        if !state.status.can_transition_to(to) {
            return Err(CatalogError::IllegalTransition {
                path: path.to_string(),
                from: state.status,
                to,
            });
        }
        if to == FileStatus::Complete
            && let Some(total) = state.chunks_total
            && state.chunks_uploaded != total
        {
            return Err(CatalogError::Incomplete {
                path: path.to_string(),
                chunks_uploaded: state.chunks_uploaded,
                chunks_total: total,
            });
        }

        let uploaded_at = (to == FileStatus::Complete).then(|| Utc::now().to_rfc3339());
        tx.execute(
            "UPDATE files SET status = ?1, uploaded_at = COALESCE(?2, uploaded_at) WHERE path = ?3",
            params![to.as_str(), uploaded_at, path],
        )?;
        tx.commit()?;

        debug!(path, from = %state.status, to = %to, "status changed");
        Ok(())
    }

    /// Records that chunk `chunk_index` was acknowledged by the remote.
    ///
    /// Chunks must be acknowledged strictly in order, so `chunk_index` has to
    /// equal the current watermark. Committed before returning.
    pub fn advance_chunk(&mut self, path: &str, chunk_index: u64) -> Result<(), CatalogError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let state = load_progress(&tx, path)?;

        if state.status != FileStatus::Uploading {
            return Err(CatalogError::NotUploading {
                path: path.to_string(),
                status: state.status,
            });
        }
        let total = state
            .chunks_total
            .ok_or_else(|| CatalogError::NotChunked(path.to_string()))?;
        if chunk_index != state.chunks_uploaded || chunk_index >= total {
            return Err(CatalogError::ChunkOutOfOrder {
                path: path.to_string(),
                chunk_index,
                expected: state.chunks_uploaded,
            });
        }

        tx.execute(
            "UPDATE files SET chunks_uploaded = ?1 WHERE path = ?2",
            params![(chunk_index + 1) as i64, path],
        )?;
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metadata & snapshot
    // -----------------------------------------------------------------------

    pub fn meta(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Raw bytes of the database file, for pushing as a manifest.
    pub fn snapshot(&self) -> Result<Vec<u8>, CatalogError> {
        let path = self.path.as_ref().ok_or(CatalogError::InMemory)?;
        Ok(std::fs::read(path)?)
    }
}

struct Progress {
    status: FileStatus,
    chunks_total: Option<u64>,
    chunks_uploaded: u64,
}

fn load_progress(tx: &Transaction<'_>, path: &str) -> Result<Progress, CatalogError> {
    let row: Option<(String, Option<i64>, Option<i64>)> = tx
        .query_row(
            "SELECT status, chunks_total, chunks_uploaded FROM files WHERE path = ?1",
            params![path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (status, chunks_total, chunks_uploaded) =
        row.ok_or_else(|| CatalogError::NotTracked(path.to_string()))?;

    Ok(Progress {
        status: status
            .parse()
            .map_err(|e| CatalogError::Corrupt(format!("{path}: {e}")))?,
        chunks_total: chunks_total.map(|n| n as u64),
        chunks_uploaded: chunks_uploaded.unwrap_or(0) as u64,
    })
}

/// Row as stored, before enum and timestamp parsing.
struct RawRecord {
    path: String,
    backup_name: String,
    file_type: String,
    size: i64,
    status: String,
    chunks_total: Option<i64>,
    chunks_uploaded: Option<i64>,
    discovered_at: String,
    uploaded_at: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            backup_name: row.get(1)?,
            file_type: row.get(2)?,
            size: row.get(3)?,
            status: row.get(4)?,
            chunks_total: row.get(5)?,
            chunks_uploaded: row.get(6)?,
            discovered_at: row.get(7)?,
            uploaded_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<FileRecord, CatalogError> {
        let corrupt = |e: String| CatalogError::Corrupt(format!("{}: {e}", self.path));

        let file_type = self.file_type.parse().map_err(corrupt)?;
        let status = self.status.parse().map_err(corrupt)?;
        let discovered_at = parse_timestamp(&self.discovered_at).map_err(corrupt)?;
        let uploaded_at = self
            .uploaded_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt)?;

        Ok(FileRecord {
            file_type,
            status,
            discovered_at,
            uploaded_at,
            size: self.size as u64,
            chunks_total: self.chunks_total.map(|n| n as u64),
            chunks_uploaded: self.chunks_uploaded.unwrap_or(0) as u64,
            path: self.path,
            backup_name: self.backup_name,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {value:?}: {e}"))
}
