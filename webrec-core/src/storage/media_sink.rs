//! Scratch file that receives media bytes verbatim.

use std::path::Path;

use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::StorageError;

const SINK_BUFFER_SIZE: usize = 64 * 1024;
const SINK_PREFIX: &str = "media-";
const SINK_SUFFIX: &str = ".part";

/// Whether `name` looks like a scratch sink file.
pub fn is_media_sink_name(name: &str) -> bool {
    name.starts_with(SINK_PREFIX) && name.ends_with(SINK_SUFFIX)
}

/// Append-only scratch file for one session's media.
///
/// The backing file is removed when the sink, or the [`CapturedMedia`] it
/// turns into, is dropped.
pub struct MediaSink {
    writer: BufWriter<File>,
    path: TempPath,
    written: u64,
}

impl MediaSink {
    /// Creates an empty sink inside `scratch_dir`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// - `StorageError::CreateSink` - Directory or file could not be created
    pub async fn create(scratch_dir: &Path) -> Result<Self, StorageError> {
        let create_sink_error = |source| StorageError::CreateSink {
            dir: scratch_dir.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(scratch_dir)
            .await
            .map_err(create_sink_error)?;
        let (file, path) = tempfile::Builder::new()
            .prefix(SINK_PREFIX)
            .suffix(SINK_SUFFIX)
            .tempfile_in(scratch_dir)
            .map_err(create_sink_error)?
            .into_parts();

        Ok(Self {
            writer: BufWriter::with_capacity(SINK_BUFFER_SIZE, File::from_std(file)),
            path,
            written: 0,
        })
    }

    /// Appends `chunk` unchanged.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Write failed
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Flushes and syncs the sink, handing over the captured file.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Flush or sync failed
    pub async fn finish(mut self) -> Result<CapturedMedia, StorageError> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok(CapturedMedia {
            path: self.path,
            len: self.written,
        })
    }
}

/// Media bytes of a finished capture, deleted on drop.
#[derive(Debug)]
pub struct CapturedMedia {
    path: TempPath,
    len: u64,
}

impl CapturedMedia {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use tokio::test;

    use super::*;
    use crate::test_fixtures::{count_entries, create_temp_storage_dirs};

    #[test]
    async fn test_sink_preserves_bytes_and_length() {
        let (_temp_dir, scratch_dir, _recordings_dir) = create_temp_storage_dirs();
        let mut sink = MediaSink::create(&scratch_dir).await.unwrap();

        sink.write(&[0x1F, 0x43, 0xB6, 0x75]).await.unwrap();
        sink.write(&[]).await.unwrap();
        sink.write(&[0xFF; 100]).await.unwrap();
        assert_eq!(sink.len(), 104);

        let media = sink.finish().await.unwrap();
        let contents = std::fs::read(media.path()).unwrap();
        assert_eq!(&contents[..4], &[0x1F, 0x43, 0xB6, 0x75]);
        assert_eq!(contents.len() as u64, media.len());
    }

    #[test]
    async fn test_dropped_sink_leaves_no_scratch_file() {
        let (_temp_dir, scratch_dir, _recordings_dir) = create_temp_storage_dirs();

        let mut sink = MediaSink::create(&scratch_dir).await.unwrap();
        sink.write(b"abandoned").await.unwrap();
        assert_eq!(count_entries(&scratch_dir), 1);
        drop(sink);
        assert_eq!(count_entries(&scratch_dir), 0);

        let media = MediaSink::create(&scratch_dir)
            .await
            .unwrap()
            .finish()
            .await
            .unwrap();
        assert!(media.is_empty());
        drop(media);
        assert_eq!(count_entries(&scratch_dir), 0);
    }

    #[test]
    async fn test_creates_missing_scratch_dir() {
        let (temp_dir, _scratch_dir, _recordings_dir) = create_temp_storage_dirs();
        let nested = temp_dir.path().join("a").join("b");

        let sink = MediaSink::create(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(sink.is_empty());
    }
}
