//! Storage layer for recordings.
//!
//! Media is first captured into a scratch file, then merged with the
//! re-encoded header into the recordings directory. Scratch files and
//! partially written recordings are temporary paths that delete themselves
//! unless promoted.

pub mod finalize;
pub mod media_sink;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub use finalize::write_recording;
pub use media_sink::{CapturedMedia, MediaSink, is_media_sink_name};
use tracing::warn;

use crate::recording::RecordingId;

/// Errors that occur during storage operations.
///
/// Every variant is a server-side fault: the recording cannot be kept.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Scratch sink could not be created
    #[error("Cannot create media sink in {dir}: {source}")]
    CreateSink {
        /// Scratch directory
        dir: PathBuf,
        source: std::io::Error,
    },

    /// Finished recording could not be moved into place
    #[error("Cannot promote recording to {destination}: {source}")]
    Promote {
        /// Final path of the recording
        destination: PathBuf,
        source: std::io::Error,
    },

    /// Destination path has no usable parent directory or file name
    #[error("Invalid destination path: {path}")]
    InvalidDestination { path: PathBuf },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scratch and recordings directories for one server.
#[derive(Debug, Clone)]
pub struct RecordingStorage {
    scratch_dir: PathBuf,
    recordings_dir: PathBuf,
}

impl RecordingStorage {
    /// Creates storage rooted at the given directories.
    ///
    /// Directories are created lazily when the first sink or recording is
    /// written.
    pub fn new(scratch_dir: PathBuf, recordings_dir: PathBuf) -> Self {
        Self {
            scratch_dir,
            recordings_dir,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    /// Creates both directories and removes scratch sinks left behind by a
    /// previous process. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - A directory cannot be created or listed
    pub async fn prepare(&self) -> Result<usize, StorageError> {
        tokio::fs::create_dir_all(&self.recordings_dir).await?;
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.scratch_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !is_media_sink_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Cannot remove stale sink");
                }
            }
        }
        Ok(removed)
    }

    /// Final path for recording `id` with the given container extension.
    pub fn destination(&self, id: &RecordingId, extension: &str) -> PathBuf {
        self.recordings_dir.join(id.file_name(extension))
    }

    /// Opens a new scratch sink for media bytes.
    ///
    /// # Errors
    ///
    /// - `StorageError::CreateSink` - Scratch directory unusable
    pub async fn create_media_sink(&self) -> Result<MediaSink, StorageError> {
        MediaSink::create(&self.scratch_dir).await
    }

    /// Writes `header` followed by the captured media to the destination of
    /// `id`, replacing any previous recording atomically.
    ///
    /// Blocking; call from a blocking context.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Staging file could not be written
    /// - `StorageError::Promote` - Rename into place failed
    pub fn finalize(
        &self,
        id: &RecordingId,
        extension: &str,
        header: &[u8],
        media: &CapturedMedia,
    ) -> Result<PathBuf, StorageError> {
        let destination = self.destination(id, extension);
        let media = BufReader::new(File::open(media.path())?);
        write_recording(&destination, header, media)?;
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use tokio::test;

    use super::*;
    use crate::test_fixtures::{count_entries, create_temp_storage_dirs};

    #[test]
    async fn test_finalize_concatenates_header_and_media() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let storage = RecordingStorage::new(scratch_dir.clone(), recordings_dir.clone());
        let id = RecordingId::parse("take-1").unwrap();

        let mut sink = storage.create_media_sink().await.unwrap();
        sink.write(b"cluster-one").await.unwrap();
        sink.write(b"cluster-two").await.unwrap();
        let media = sink.finish().await.unwrap();

        let path = storage.finalize(&id, "webm", b"HEADER", &media).unwrap();

        assert_eq!(path, recordings_dir.join("take-1.webm"));
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"HEADERcluster-onecluster-two"
        );
        assert_eq!(count_entries(&recordings_dir), 1);

        drop(media);
        assert_eq!(count_entries(&scratch_dir), 0);
    }

    #[test]
    async fn test_prepare_sweeps_only_stale_sinks() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let storage = RecordingStorage::new(scratch_dir.clone(), recordings_dir.clone());
        let stale = storage.create_media_sink().await.unwrap();
        // Simulate a crash: the sink file outlives its owner
        let stale = stale.finish().await.unwrap();
        let kept = stale.path().to_path_buf();
        std::mem::forget(stale);
        std::fs::write(scratch_dir.join("notes.txt"), b"keep").unwrap();

        assert_eq!(storage.prepare().await.unwrap(), 1);

        assert!(!kept.exists());
        assert!(scratch_dir.join("notes.txt").exists());
        assert!(recordings_dir.is_dir());
    }

    #[test]
    async fn test_sink_in_unusable_scratch_dir_fails() {
        let (temp_dir, _scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let storage = RecordingStorage::new(blocker, recordings_dir);

        let result = storage.create_media_sink().await;
        assert!(matches!(result, Err(StorageError::CreateSink { .. })));
    }
}
