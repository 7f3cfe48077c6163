//! Upload engine: drains the catalog one file at a time.
//!
//! Selection order comes from [`Catalog::next_to_upload_excluding`]: an
//! interrupted `uploading` file first, then pending files smallest first.
//! Each file is attempted at most once per run, so a file the remote
//! refuses goes back to `pending` and waits for the next run.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mediabackup_catalog::{Catalog, ChunkPolicy, FileRecord, FileStatus};
use mediabackup_transfer::{
    ChunkReader, Delivery, MultipartRequest, RetryingClient, Sleeper, TokioSleeper,
    TransferError, Transport, resolve_under,
};
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::types::{EventCallback, RunReport, UploadEvent};

/// How the remote answered for a whole file.
enum Sent {
    Done,
    Rejected(u16),
}

/// What happened to one file.
enum Outcome {
    Completed,
    Requeued,
    Failed,
    Halted,
}

/// Sequential uploader bound to one backup root and its catalog.
pub struct UploadEngine<'a, T, S = TokioSleeper> {
    catalog: &'a mut Catalog,
    client: &'a RetryingClient<T, S>,
    root: PathBuf,
    backup_id: String,
    policy: ChunkPolicy,
    on_event: Option<EventCallback>,
}

impl<'a, T: Transport, S: Sleeper> UploadEngine<'a, T, S> {
    /// `policy` must be the one the catalog was populated with; it sets the
    /// byte offset of every chunk.
    pub fn new(
        catalog: &'a mut Catalog,
        client: &'a RetryingClient<T, S>,
        root: &Path,
        backup_id: &str,
        policy: ChunkPolicy,
    ) -> Self {
        Self {
            catalog,
            client,
            root: root.to_path_buf(),
            backup_id: backup_id.to_string(),
            policy,
            on_event: None,
        }
    }

    /// Registers a callback for progress events.
    pub fn on_event(mut self, callback: impl Fn(&UploadEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Uploads every outstanding file once.
    ///
    /// Returns early with [`RunReport::halted`] set when the connection is
    /// lost; the file in flight stays `uploading` for the next run. Catalog
    /// errors abort the run and are returned.
    pub async fn run(&mut self) -> Result<RunReport, UploadError> {
        let outstanding = self.catalog.outstanding()?;
        let mut report = RunReport {
            outstanding,
            ..RunReport::default()
        };
        let mut attempted = HashSet::new();

        while let Some(record) = self.catalog.next_to_upload_excluding(&attempted)? {
            attempted.insert(record.path.clone());
            self.emit(UploadEvent::Started {
                position: attempted.len() as u64,
                total: outstanding,
                backup_name: record.backup_name.clone(),
                size: record.size,
            });

            match self.upload_file(&record).await? {
                Outcome::Completed => report.completed += 1,
                Outcome::Requeued => report.requeued += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Halted => {
                    report.halted = true;
                    break;
                }
            }
        }

        info!(
            completed = report.completed,
            requeued = report.requeued,
            failed = report.failed,
            halted = report.halted,
            "upload run finished"
        );
        Ok(report)
    }

    async fn upload_file(&mut self, record: &FileRecord) -> Result<Outcome, UploadError> {
        if record.status == FileStatus::Pending {
            self.catalog.mark_uploading(&record.path)?;
        }

        let sent = match record.chunks_total {
            None => self.send_whole(record).await,
            Some(total) => self.send_chunks(record, total).await,
        };

        match sent {
            Ok(Sent::Done) => {
                self.catalog.mark_complete(&record.path)?;
                debug!(backup_name = %record.backup_name, "file complete");
                self.emit(UploadEvent::Completed {
                    backup_name: record.backup_name.clone(),
                });
                Ok(Outcome::Completed)
            }
            Ok(Sent::Rejected(status)) => {
                self.catalog.mark_pending(&record.path)?;
                warn!(backup_name = %record.backup_name, status, "upload rejected, requeued");
                self.emit(UploadEvent::Rejected {
                    backup_name: record.backup_name.clone(),
                    status,
                });
                Ok(Outcome::Requeued)
            }
            Err(UploadError::Transfer(e)) if e.is_connection() => {
                warn!(backup_name = %record.backup_name, error = %e, "connection lost, halting run");
                self.emit(UploadEvent::ConnectionLost {
                    backup_name: record.backup_name.clone(),
                    error: e.to_string(),
                });
                Ok(Outcome::Halted)
            }
            Err(e) => match unreadable_source(&e) {
                Some(reason) => {
                    self.catalog.mark_failed(&record.path)?;
                    warn!(path = %record.path, %reason, "source unreadable, marked failed");
                    self.emit(UploadEvent::Failed {
                        backup_name: record.backup_name.clone(),
                        path: record.path.clone(),
                        reason,
                    });
                    Ok(Outcome::Failed)
                }
                None => Err(e),
            },
        }
    }

    async fn send_whole(&self, record: &FileRecord) -> Result<Sent, UploadError> {
        let source = resolve_under(&self.root, &record.path)?;
        let data = std::fs::read(&source)?;
        let request = MultipartRequest::upload(&self.backup_id, &record.backup_name, data);

        Ok(match self.client.post(&request).await? {
            Delivery::Accepted { .. } => Sent::Done,
            Delivery::Rejected { status } => Sent::Rejected(status),
        })
    }

    /// Sends the chunks past the watermark in index order, committing the
    /// watermark after each acknowledgment.
    async fn send_chunks(
        &mut self,
        record: &FileRecord,
        chunks_total: u64,
    ) -> Result<Sent, UploadError> {
        let source = resolve_under(&self.root, &record.path)?;
        let mut reader = ChunkReader::open(&source, self.policy.chunk_size)?;
        reader.seek_to_chunk(record.chunks_uploaded)?;

        if record.chunks_uploaded > 0 {
            debug!(
                backup_name = %record.backup_name,
                from = record.chunks_uploaded,
                chunks_total,
                "resuming chunked upload"
            );
        }

        for index in record.remaining_chunks() {
            let chunk = reader.next_chunk()?.ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("source ends before chunk {index} of {chunks_total}"),
                )
            })?;
            let request =
                MultipartRequest::chunk(&self.backup_id, &record.backup_name, chunk, chunks_total);

            match self.client.post(&request).await? {
                Delivery::Accepted { .. } => {
                    self.catalog.advance_chunk(&record.path, index)?;
                    self.emit(UploadEvent::ChunkSent {
                        backup_name: record.backup_name.clone(),
                        chunk_index: index,
                        chunks_total,
                    });
                }
                Delivery::Rejected { status } => return Ok(Sent::Rejected(status)),
            }
        }

        Ok(Sent::Done)
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }
}

/// Failures reading the catalogued source: gone, shrunk, unreadable or not
/// a regular file. They fail that file only; catalog errors stay fatal.
fn unreadable_source(err: &UploadError) -> Option<String> {
    match err {
        UploadError::Io(e) | UploadError::Transfer(TransferError::Io(e)) => Some(e.to_string()),
        UploadError::Transfer(TransferError::InvalidPath(p)) => Some(format!("invalid path: {p}")),
        _ => None,
    }
}
