//! Discovery: walks a backup root and registers new media files.
//!
//! Relative paths are normalized to forward slashes so the catalog key is
//! the same on every platform.

use std::path::Path;

use mediabackup_catalog::{Catalog, ChunkPolicy, FileType};
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::types::ScanSummary;

/// Name of the per-root state directory, never scanned.
pub const STATE_DIR_NAME: &str = ".mediabackup";

/// Maps a path to its media type by lower-cased extension.
///
/// Returns `None` for unsupported or missing extensions.
pub fn classify(path: &Path) -> Option<FileType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let file_type = match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" | "bmp" | "tiff" => FileType::Image,
        "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" => FileType::Video,
        "mp3" | "wav" | "flac" | "m4a" | "aac" | "ogg" => FileType::Audio,
        "pdf" => FileType::Document,
        _ => return None,
    };
    Some(file_type)
}

/// A supported file found on disk.
struct Found {
    rel_path: String,
    file_type: FileType,
    extension: String,
    size: u64,
}

/// Registers every supported file under `root` that the catalog does not
/// track yet.
///
/// Files are visited in sorted path order so that sequence numbers follow
/// a predictable order on the first scan. Already-tracked paths are left
/// untouched, which makes re-scanning an unchanged tree a no-op.
pub fn scan_directory(
    root: &Path,
    catalog: &mut Catalog,
    policy: &ChunkPolicy,
) -> Result<ScanSummary, UploadError> {
    let mut found = Vec::new();
    walk_dir(root, root, &mut found)?;
    found.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    let mut summary = ScanSummary::default();
    for file in found {
        let registration = catalog.register_if_absent(
            &file.rel_path,
            file.file_type,
            &file.extension,
            file.size,
            policy,
        )?;
        if registration.created {
            *summary.added.entry(file.file_type).or_default() += 1;
        } else {
            summary.skipped += 1;
        }
    }

    debug!(
        root = %root.display(),
        added = summary.total_added(),
        skipped = summary.skipped,
        "scan finished"
    );
    Ok(summary)
}

fn walk_dir(root: &Path, current: &Path, found: &mut Vec<Found>) -> Result<(), UploadError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let mut metadata = entry.metadata()?;

        // Follow links to files; linked directories are not descended into.
        if metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(target) if target.is_file() => metadata = target,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping broken symlink");
                    continue;
                }
            }
        }

        if metadata.is_dir() {
            if current == root && entry.file_name() == STATE_DIR_NAME {
                continue;
            }
            walk_dir(root, &path, found)?;
        } else if metadata.is_file() {
            let Some(file_type) = classify(&path) else {
                continue;
            };
            let Some(rel_path) = relative_key(root, &path) else {
                warn!(path = %path.display(), "skipping file with non UTF-8 path");
                continue;
            };
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();

            found.push(Found {
                rel_path,
                file_type,
                extension,
                size: metadata.len(),
            });
        }
    }

    Ok(())
}

/// `/`-separated path of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.iter().map(|c| c.to_str()).collect();
    Some(parts?.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediabackup_catalog::FileStatus;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join("beach.JPG"), b"JPEG").unwrap();
        fs::write(root.join("notes.txt"), b"ignored").unwrap();
        fs::write(root.join("scan.pdf"), b"PDF").unwrap();

        fs::create_dir_all(root.join("2024").join("summer")).unwrap();
        fs::write(root.join("2024").join("summer").join("clip.mov"), b"MOVIE_DATA").unwrap();
        fs::write(root.join("2024").join("alps.png"), b"PNG").unwrap();

        fs::create_dir_all(root.join(STATE_DIR_NAME)).unwrap();
        fs::write(root.join(STATE_DIR_NAME).join("thumb.jpg"), b"NOPE").unwrap();

        dir
    }

    #[test]
    fn classify_by_extension() {
        assert_eq!(classify(Path::new("a.jpeg")), Some(FileType::Image));
        assert_eq!(classify(Path::new("a.HEIC")), Some(FileType::Image));
        assert_eq!(classify(Path::new("a.mkv")), Some(FileType::Video));
        assert_eq!(classify(Path::new("a.flac")), Some(FileType::Audio));
        assert_eq!(classify(Path::new("a.pdf")), Some(FileType::Document));
        assert_eq!(classify(Path::new("a.docx")), None);
        assert_eq!(classify(Path::new("Makefile")), None);
    }

    #[test]
    fn scan_registers_supported_files_only() {
        let dir = create_test_tree();
        let mut catalog = Catalog::open_in_memory().unwrap();

        let summary = scan_directory(dir.path(), &mut catalog, &ChunkPolicy::default()).unwrap();
        assert_eq!(summary.total_added(), 4);
        assert_eq!(summary.added[&FileType::Image], 2);
        assert_eq!(summary.added[&FileType::Video], 1);
        assert_eq!(summary.added[&FileType::Document], 1);
        assert_eq!(summary.skipped, 0);

        assert!(catalog.get("notes.txt").unwrap().is_none());
        assert!(catalog.get(".mediabackup/thumb.jpg").unwrap().is_none());

        let clip = catalog.get("2024/summer/clip.mov").unwrap().unwrap();
        assert_eq!(clip.backup_name, "VID_000001.mov");
        assert_eq!(clip.size, 10);
        assert_eq!(clip.status, FileStatus::Pending);
    }

    #[test]
    fn names_follow_sorted_path_order() {
        let dir = create_test_tree();
        let mut catalog = Catalog::open_in_memory().unwrap();
        scan_directory(dir.path(), &mut catalog, &ChunkPolicy::default()).unwrap();

        // "2024/alps.png" sorts before "beach.JPG".
        assert_eq!(
            catalog.get("2024/alps.png").unwrap().unwrap().backup_name,
            "IMG_000001.png"
        );
        assert_eq!(
            catalog.get("beach.JPG").unwrap().unwrap().backup_name,
            "IMG_000002.jpg"
        );
    }

    #[test]
    fn rescan_is_idempotent() {
        let dir = create_test_tree();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let policy = ChunkPolicy::default();

        scan_directory(dir.path(), &mut catalog, &policy).unwrap();
        let again = scan_directory(dir.path(), &mut catalog, &policy).unwrap();
        assert_eq!(again.total_added(), 0);
        assert_eq!(again.skipped, 4);

        // A new file continues the sequence without drift.
        fs::write(dir.path().join("zebra.gif"), b"GIF").unwrap();
        let third = scan_directory(dir.path(), &mut catalog, &policy).unwrap();
        assert_eq!(third.total_added(), 1);
        assert_eq!(
            catalog.get("zebra.gif").unwrap().unwrap().backup_name,
            "IMG_000003.gif"
        );
        assert_eq!(catalog.summary().unwrap().total().count, 5);
    }

    #[test]
    fn chunking_decided_at_scan_time() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("small.mp3"), vec![0u8; 3]).unwrap();
        fs::write(dir.path().join("big.mp3"), vec![0u8; 9]).unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        scan_directory(dir.path(), &mut catalog, &ChunkPolicy::new(4)).unwrap();

        assert_eq!(catalog.get("small.mp3").unwrap().unwrap().chunks_total, None);
        assert_eq!(catalog.get("big.mp3").unwrap().unwrap().chunks_total, Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn follows_file_symlinks() {
        let media = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("real.png"), b"PNGDATA").unwrap();
        std::os::unix::fs::symlink(outside.path().join("real.png"), media.path().join("link.png"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.png"), media.path().join("dead.png"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), media.path().join("linked_dir")).unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        let summary = scan_directory(media.path(), &mut catalog, &ChunkPolicy::default()).unwrap();

        assert_eq!(summary.total_added(), 1);
        let link = catalog.get("link.png").unwrap().unwrap();
        assert_eq!(link.size, 7);
        assert!(catalog.get("dead.png").unwrap().is_none());
        assert!(catalog.get("linked_dir/real.png").unwrap().is_none());
    }

    #[test]
    fn scan_empty_dir() {
        let dir = TempDir::new().unwrap();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let summary = scan_directory(dir.path(), &mut catalog, &ChunkPolicy::default()).unwrap();
        assert_eq!(summary, ScanSummary::default());
    }

    #[test]
    fn scan_nonexistent_dir() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let result = scan_directory(
            Path::new("/nonexistent/path/that/does/not/exist"),
            &mut catalog,
            &ChunkPolicy::default(),
        );
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
