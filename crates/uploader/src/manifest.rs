//! Manifest sync: pushes the raw catalog database to the remote.
//!
//! Best effort. A refused manifest is reported to the caller but never
//! touches upload state.

use mediabackup_catalog::Catalog;
use mediabackup_transfer::{Delivery, MultipartRequest, RetryingClient, Sleeper, Transport};
use tracing::{info, warn};

use crate::error::UploadError;

/// File name the snapshot is uploaded under.
pub const MANIFEST_FILE_NAME: &str = "state.db";

/// Posts a snapshot of `catalog` to the manifest endpoint.
///
/// Connection failures that outlast the retry ladder are returned as
/// [`UploadError::Transfer`].
pub async fn sync_manifest<T: Transport, S: Sleeper>(
    client: &RetryingClient<T, S>,
    backup_id: &str,
    catalog: &Catalog,
) -> Result<Delivery, UploadError> {
    let data = catalog.snapshot()?;
    let size = data.len();
    let request = MultipartRequest::manifest(backup_id, MANIFEST_FILE_NAME, data);

    let delivery = client.post(&request).await?;
    match delivery {
        Delivery::Accepted { .. } => info!(backup_id, size, "manifest synced"),
        Delivery::Rejected { status } => warn!(backup_id, status, "manifest rejected"),
    }
    Ok(delivery)
}
