//! Recursive tar+gzip archive production.

use std::fs::File;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, SnapshotError};

/// Walks `root` recursively and writes a `gzip(tar(...))` archive of every
/// regular file found to `archive_path`.
///
/// Directory entries are visited in sorted-by-name order so that, for an
/// unchanged tree, the archive's member order (and therefore its ETag) stays
/// stable across runs.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if `root` does not exist,
/// [`SnapshotError::NotADirectory`] if it is not a directory, or
/// [`SnapshotError::Io`] for any failure while walking or writing.
pub fn create_archive(root: &Path, archive_path: &Path) -> Result<()> {
    if !root.exists() {
        return Err(SnapshotError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(SnapshotError::NotADirectory(root.to_path_buf()));
    }

    info!(root = %root.display(), "starting snapshot walk");

    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);

    let mut file_count = 0usize;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "error walking directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        debug!(path = %relative.display(), "appending file to archive");
        tar.append_path_with_name(entry.path(), relative)?;
        file_count += 1;
    }

    let encoder = tar.into_inner()?;
    encoder.finish()?;

    info!(file_count, archive = %archive_path.display(), "snapshot archive written");
    Ok(())
}
