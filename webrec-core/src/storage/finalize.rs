//! Header/media merge into the final recording.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use super::StorageError;

/// Writes `header` followed by everything readable from `media` to
/// `destination`.
///
/// Output is staged in a hidden temporary file next to the destination and
/// renamed over it only after everything is written and synced, so readers
/// see either the previous recording or the complete new one. On any error
/// the staging file is removed. Missing parent directories are created.
///
/// Returns the size of the written recording.
///
/// # Errors
///
/// - `StorageError::InvalidDestination` - No file name or parent directory
/// - `StorageError::Io` - Staging, reading media, or syncing failed
/// - `StorageError::Promote` - Rename into place failed
pub fn write_recording<R: Read>(
    destination: &Path,
    header: &[u8],
    mut media: R,
) -> Result<u64, StorageError> {
    let invalid = || StorageError::InvalidDestination {
        path: destination.to_path_buf(),
    };
    let file_name = destination.file_name().ok_or_else(invalid)?;
    let parent = destination.parent().ok_or_else(invalid)?;
    fs::create_dir_all(parent)?;

    let staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name.to_string_lossy()))
        .suffix(".partial")
        .tempfile_in(parent)?;

    let mut writer = BufWriter::new(staged);
    writer.write_all(header)?;
    let media_len = io::copy(&mut media, &mut writer)?;
    let staged = writer.into_inner().map_err(|e| e.into_error())?;
    staged.as_file().sync_all()?;

    staged
        .persist(destination)
        .map_err(|e| StorageError::Promote {
            destination: destination.to_path_buf(),
            source: e.error,
        })?;

    let total = header.len() as u64 + media_len;
    debug!(
        destination = %destination.display(),
        header_bytes = header.len(),
        media_bytes = media_len,
        "Recording written"
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{count_entries, create_temp_storage_dirs};

    #[test]
    fn test_creates_parent_and_replaces_previous() {
        let (temp_dir, scratch_dir, _recordings_dir) = create_temp_storage_dirs();
        let destination = temp_dir.path().join("deep").join("dir").join("a.webm");

        assert_eq!(write_recording(&destination, b"first", &b"-media"[..]).unwrap(), 11);
        assert_eq!(write_recording(&destination, b"second", &b"-media"[..]).unwrap(), 12);
        assert_eq!(count_entries(&scratch_dir), 0);

        assert_eq!(fs::read(&destination).unwrap(), b"second-media");
        assert_eq!(count_entries(destination.parent().unwrap()), 1);
    }

    #[test]
    fn test_failed_promote_leaves_no_staging_file() {
        let (_temp_dir, _scratch_dir, recordings_dir) = create_temp_storage_dirs();
        // A non-empty directory where the recording should go
        let destination = recordings_dir.join("blocked.webm");
        fs::create_dir_all(destination.join("occupied")).unwrap();

        let result = write_recording(&destination, b"header", &b"bytes"[..]);

        assert!(matches!(result, Err(StorageError::Promote { .. })));
        assert_eq!(count_entries(&recordings_dir), 1);
        assert!(destination.is_dir());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk went away"))
        }
    }

    #[test]
    fn test_unreadable_media_leaves_nothing_behind() {
        let (_temp_dir, _scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let destination = recordings_dir.join("a.webm");

        let result = write_recording(&destination, b"header", FailingReader);

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!destination.exists());
        assert_eq!(count_entries(&recordings_dir), 0);
    }
}
