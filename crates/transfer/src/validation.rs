use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Checks that a catalog path stays inside the backup root.
///
/// Rejects empty paths, absolute paths, Windows prefixes and any `..`
/// component.
pub fn validate_relative_path(rel_path: &str) -> Result<(), TransferError> {
    if rel_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(rel_path);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {rel_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {rel_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {rel_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Joins a validated catalog path onto `root`.
pub fn resolve_under(root: &Path, rel_path: &str) -> Result<PathBuf, TransferError> {
    validate_relative_path(rel_path)?;
    Ok(root.join(rel_path))
}
