//! Content-digest ETag computation, shared by the Manager and the Agent.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Result;

/// Length of the hex ETag string. MD5 hex-encodes to 32 characters; the
/// pull wire's ETag frame (64 bytes) is wider than this and pads the rest.
pub const ETAG_LEN: usize = 32;

/// Computes the ETag of an already-written `gzip(tar(...))` archive:
/// gzip-decodes it, walks every tar member, and hashes the concatenation of
/// their content bytes (headers excluded).
///
/// Because both the Manager (re-reading its last stored archive) and the
/// Agent (digesting the archive it just produced) run this same function,
/// matching ETags mean "no change since last snapshot".
///
/// # Errors
///
/// Returns [`SnapshotError::Io`](crate::SnapshotError::Io) if the archive
/// cannot be opened, is not valid gzip, or its tar stream is malformed.
pub fn compute_archive_etag(archive_path: &Path) -> Result<String> {
    let file = File::open(archive_path)?;
    let gz = GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    let mut ctx = md5::Context::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let mut buf = [0u8; 8192];
        loop {
            let read = entry.read(&mut buf)?;
            if read == 0 {
                break;
            }
            ctx.consume(&buf[..read]);
        }
    }

    Ok(format!("{:x}", ctx.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::create_archive;

    #[test]
    fn etag_is_stable_for_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();

        let archive_a = dir.path().join("a.tar.gz");
        let archive_b = dir.path().join("b.tar.gz");
        create_archive(&root, &archive_a).unwrap();
        create_archive(&root, &archive_b).unwrap();

        let etag_a = compute_archive_etag(&archive_a).unwrap();
        let etag_b = compute_archive_etag(&archive_b).unwrap();
        assert_eq!(etag_a, etag_b);
        assert_eq!(etag_a.len(), ETAG_LEN);
    }

    #[test]
    fn etag_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();

        let archive_a = dir.path().join("a.tar.gz");
        create_archive(&root, &archive_a).unwrap();
        let etag_a = compute_archive_etag(&archive_a).unwrap();

        std::fs::write(root.join("a.txt"), b"hello world").unwrap();
        let archive_b = dir.path().join("b.tar.gz");
        create_archive(&root, &archive_b).unwrap();
        let etag_b = compute_archive_etag(&archive_b).unwrap();

        assert_ne!(etag_a, etag_b);
    }
}
