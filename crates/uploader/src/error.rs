//! Upload pipeline error types.

use mediabackup_catalog::CatalogError;
use mediabackup_transfer::TransferError;

/// Errors that abort a scan, an upload run or a manifest sync.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}
