//! Inspection and finalization of WebM files already on disk.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::RecordingError;
use super::duration::{DurationError, TimestampSpan, scan_media};
use crate::container::{ContainerHeader, HeaderError, parse_header};
use crate::ebml::EbmlReader;
use crate::storage::{StorageError, write_recording};

/// Structure and content-based timing of a WebM file.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub path: PathBuf,
    pub header: ContainerHeader,
    pub header_bytes: u64,
    pub media_bytes: u64,
    pub span: TimestampSpan,
}

impl RecordingReport {
    /// Duration derived from block timestamps, in ticks.
    pub fn content_duration_ticks(&self) -> Option<u64> {
        self.span.duration_ticks()
    }

    /// Duration derived from block timestamps, in milliseconds.
    pub fn content_duration_ms(&self) -> Option<f64> {
        self.content_duration_ticks()
            .map(|ticks| ticks as f64 * self.header.info.timecode_scale as f64 / 1_000_000.0)
    }
}

/// Parses the header of `path` and scans its clusters.
///
/// # Errors
///
/// - `RecordingError::Storage` - File cannot be opened or read
/// - `RecordingError::MalformedContainer` - Header invalid or cut short
/// - `RecordingError::Duration` - Media after the header is not cluster data
pub fn inspect_file(path: &Path) -> Result<RecordingReport, RecordingError> {
    let file = File::open(path).map_err(StorageError::from)?;
    let file_len = file.metadata().map_err(StorageError::from)?.len();

    let mut reader = EbmlReader::new(BufReader::new(file));
    let header = parse_header(&mut reader).map_err(|e| match e {
        HeaderError::Incomplete => HeaderError::Truncated {
            received: file_len as usize,
        },
        other => other,
    })?;
    let header_bytes = reader.position();

    let span = scan_media(open_media(path, header_bytes)?)?;
    Ok(RecordingReport {
        path: path.to_path_buf(),
        header,
        header_bytes,
        media_bytes: file_len.saturating_sub(header_bytes),
        span,
    })
}

/// Rewrites `input` to `output` with a content-based duration and an
/// unknown-size Segment, keeping media bytes unchanged.
///
/// `input` may be a raw capture that was never finalized, or an earlier
/// recording whose duration should be recomputed.
///
/// # Errors
///
/// - everything [`inspect_file`] returns
/// - `RecordingError::Duration` - No complete block in the media
/// - `RecordingError::Serialization` - Header cannot be re-encoded
/// - `RecordingError::Storage` - Output cannot be written
pub fn finalize_file(input: &Path, output: &Path) -> Result<RecordingReport, RecordingError> {
    let mut report = inspect_file(input)?;
    if report.media_bytes == 0 {
        return Err(DurationError::NoMedia.into());
    }
    let ticks = report
        .content_duration_ticks()
        .ok_or(DurationError::NoBlocks)?;

    report.header.info.duration = Some(ticks as f64);
    let header_bytes = report.header.to_bytes()?;
    write_recording(output, &header_bytes, open_media(input, report.header_bytes)?)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        duration_ticks = ticks,
        "Recording finalized offline"
    );
    report.path = output.to_path_buf();
    report.header_bytes = header_bytes.len() as u64;
    Ok(report)
}

fn open_media(path: &Path, offset: u64) -> Result<BufReader<File>, StorageError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(BufReader::new(file))
}
