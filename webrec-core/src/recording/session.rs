//! One recording session: header, media, duration, merge.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::duration::DurationCalculator;
use super::extractor::{ExtractedHeader, read_header};
use super::media_buffer::{BufferedMedia, MediaBuffer};
use super::{ActiveRecordings, IngestEnd, RecordingError, RecordingId, TransportFault};
use crate::config::{RecordingConfig, WebrecConfig};
use crate::container::ContainerHeader;
use crate::storage::{CapturedMedia, RecordingStorage};

/// Result of a successful session.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingOutcome {
    pub id: String,
    pub path: PathBuf,
    /// Info.Duration written to the file, in TimecodeScale ticks
    pub duration_ticks: f64,
    pub duration_ms: f64,
    pub media_bytes: u64,
    pub ended_by: IngestEnd,
}

/// Runs recording sessions against one storage location.
///
/// Cheap to share behind an `Arc`; sessions for different identifiers run
/// concurrently, a second session for an active identifier is refused.
#[derive(Debug)]
pub struct Recorder {
    config: RecordingConfig,
    storage: RecordingStorage,
    active: ActiveRecordings,
}

impl Recorder {
    pub fn new(config: RecordingConfig, storage: RecordingStorage) -> Self {
        Self {
            config,
            storage,
            active: ActiveRecordings::new(),
        }
    }

    /// Builds a recorder from the recording and storage sections.
    pub fn from_config(config: &WebrecConfig) -> Self {
        let storage = RecordingStorage::new(
            config.storage.scratch_dir.clone(),
            config.storage.recordings_dir.clone(),
        );
        Self::new(config.recording.clone(), storage)
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn storage(&self) -> &RecordingStorage {
        &self.storage
    }

    pub fn active(&self) -> &ActiveRecordings {
        &self.active
    }

    /// Records `body` under the identifier `raw_id`.
    ///
    /// On success the finalized file exists at the returned path. On error
    /// nothing is left in the scratch directory and no recording is written
    /// or replaced.
    ///
    /// # Errors
    ///
    /// See [`RecordingError`]; every variant can surface here.
    pub async fn record<S>(
        &self,
        raw_id: &str,
        body: S,
    ) -> Result<RecordingOutcome, RecordingError>
    where
        S: Stream<Item = Result<Bytes, TransportFault>> + Send + Unpin,
    {
        let session = Uuid::new_v4();
        let span = info_span!("recording", %session, id = raw_id);

        async move {
            let result = self.run(raw_id, body).await;
            match &result {
                Ok(outcome) => info!(
                    path = %outcome.path.display(),
                    duration_ms = outcome.duration_ms,
                    media_bytes = outcome.media_bytes,
                    ended_by = ?outcome.ended_by,
                    "Recording finalized"
                ),
                Err(e) if e.is_peer_abort() => info!(error = %e, "Recording abandoned by peer"),
                Err(e) if e.is_client_error() => warn!(error = %e, "Recording rejected"),
                Err(e) => error!(error = %e, "Recording failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run<S>(&self, raw_id: &str, mut body: S) -> Result<RecordingOutcome, RecordingError>
    where
        S: Stream<Item = Result<Bytes, TransportFault>> + Send + Unpin,
    {
        let id = RecordingId::parse(raw_id)?;
        let _claim = self
            .active
            .claim(&id)
            .ok_or_else(|| RecordingError::InProgress { id: id.clone() })?;

        let started = Instant::now();
        let limit = self.config.max_session_duration;
        let (extracted, buffered) = tokio::time::timeout(limit, self.ingest(&mut body))
            .await
            .map_err(|_| RecordingError::TimedOut { limit })??;
        // Timing ends with the last input, not with the idle timeout
        let elapsed = buffered.last_input.duration_since(started);

        let storage = self.storage.clone();
        let strategy = self.config.duration_strategy;
        let ended_by = buffered.ended_by;
        let BufferedMedia { media, .. } = buffered;
        let media_bytes = media.len();

        let (path, duration_ticks, duration_ms) = tokio::task::spawn_blocking(move || {
            let scale = extracted.header.info.timecode_scale;
            let calculator = DurationCalculator::new(strategy, scale);
            finalize(&storage, &id, extracted.header, &media, calculator, elapsed)
        })
        .await
        .map_err(|e| RecordingError::TaskFailed {
            reason: e.to_string(),
        })??;

        Ok(RecordingOutcome {
            id: raw_id.to_string(),
            path,
            duration_ticks,
            duration_ms,
            media_bytes,
            ended_by,
        })
    }

    async fn ingest<S>(
        &self,
        body: &mut S,
    ) -> Result<(ExtractedHeader, BufferedMedia), RecordingError>
    where
        S: Stream<Item = Result<Bytes, TransportFault>> + Send + Unpin,
    {
        let mut extracted =
            read_header(body, self.config.max_header_bytes, self.config.idle_timeout).await?;
        let remainder = std::mem::take(&mut extracted.remainder);

        let sink = self.storage.create_media_sink().await?;
        let buffered = MediaBuffer::new(sink, self.config.idle_timeout)
            .pump(remainder, body)
            .await?;
        Ok((extracted, buffered))
    }
}

/// Injects the duration, re-encodes the header and merges it with the
/// captured media. Blocking.
fn finalize(
    storage: &RecordingStorage,
    id: &RecordingId,
    mut header: ContainerHeader,
    media: &CapturedMedia,
    calculator: DurationCalculator,
    elapsed: Duration,
) -> Result<(PathBuf, f64, f64), RecordingError> {
    let duration = calculator.compute(media.path(), media.len(), elapsed)?;
    header.info.duration = Some(duration);
    let duration_ms = header.info.duration_ms().unwrap_or_default();
    debug!(
        strategy = %calculator.strategy(),
        duration_ticks = duration,
        duration_ms,
        "Duration injected"
    );

    let header_bytes = header.to_bytes()?;
    let path = storage.finalize(id, header.extension(), &header_bytes, media)?;
    Ok((path, duration, duration_ms))
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};
    use tokio::test;

    use super::*;
    use crate::recording::DurationStrategy;
    use crate::test_fixtures::{
        WebmFixture, chunked, count_entries, create_temp_storage_dirs, read_recording,
    };

    fn recorder(scratch_dir: PathBuf, recordings_dir: PathBuf) -> Recorder {
        Recorder::from_config(&WebrecConfig::for_testing(scratch_dir, recordings_dir))
    }

    #[test]
    async fn test_records_complete_stream() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let recorder = recorder(scratch_dir.clone(), recordings_dir.clone());
        let fixture = WebmFixture::new()
            .cluster(0, &[0, 100])
            .cluster(5000, &[0, 200]);

        let outcome = recorder
            .record("A", stream::iter(chunked(&fixture.to_bytes(), 512)))
            .await
            .unwrap();

        assert_eq!(outcome.path, recordings_dir.join("A.webm"));
        assert_eq!(outcome.duration_ticks, 5200.0);
        assert_eq!(outcome.ended_by, IngestEnd::Completed);
        assert_eq!(outcome.media_bytes, fixture.media_bytes().len() as u64);

        let (header, media) = read_recording(&outcome.path);
        assert_eq!(header.info.duration, Some(5200.0));
        assert_eq!(media, fixture.media_bytes());
        assert_eq!(count_entries(&scratch_dir), 0);
        assert!(recorder.active().is_empty());
    }

    #[test]
    async fn test_matroska_gets_mkv_extension() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let recorder = recorder(scratch_dir, recordings_dir.clone());
        let fixture = WebmFixture::new().doc_type("matroska").cluster(0, &[0, 40]);

        let outcome = recorder
            .record("mk", stream::iter(chunked(&fixture.to_bytes(), 64)))
            .await
            .unwrap();

        assert_eq!(outcome.path, recordings_dir.join("mk.mkv"));
    }

    #[test]
    async fn test_timing_strategy_uses_elapsed_time() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let mut config = WebrecConfig::for_testing(scratch_dir, recordings_dir);
        config.recording.duration_strategy = DurationStrategy::Timing;
        let recorder = Recorder::from_config(&config);
        let fixture = WebmFixture::new().cluster(0, &[0, 5000]);

        let outcome = recorder
            .record("timed", stream::iter(chunked(&fixture.to_bytes(), 64)))
            .await
            .unwrap();

        let (header, _media) = read_recording(&outcome.path);
        let duration = header.info.duration.unwrap();
        assert!(duration.is_finite() && duration >= 0.0);
        assert!(duration < 5000.0);
    }

    #[test(start_paused = true)]
    async fn test_timing_strategy_stops_at_last_chunk_when_stalled() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let mut config = WebrecConfig::for_testing(scratch_dir, recordings_dir);
        config.recording.duration_strategy = DurationStrategy::Timing;
        config.recording.idle_timeout = Duration::from_millis(1500);
        let recorder = Recorder::from_config(&config);
        let fixture = WebmFixture::new().cluster(0, &[0, 5000]);
        let body = stream::iter(chunked(&fixture.to_bytes(), 64)).chain(stream::pending());

        let outcome = recorder.record("stalled", body).await.unwrap();

        assert_eq!(outcome.ended_by, IngestEnd::Stalled);
        let (header, _media) = read_recording(&outcome.path);
        let duration = header.info.duration.unwrap();
        assert!(duration.is_finite() && duration >= 0.0);
        assert!(duration < 1500.0, "idle window counted: {duration}");
    }

    #[test]
    async fn test_header_only_stream_is_empty_recording() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let recorder = recorder(scratch_dir.clone(), recordings_dir.clone());
        let header = WebmFixture::new().header_bytes();

        let err = recorder
            .record("nothing", stream::iter(chunked(&header, 100)))
            .await
            .unwrap_err();

        assert!(err.is_empty_recording());
        assert_eq!(count_entries(&recordings_dir), 0);
        assert_eq!(count_entries(&scratch_dir), 0);
    }

    #[test]
    async fn test_invalid_identifier_is_rejected_before_reading() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let recorder = recorder(scratch_dir, recordings_dir);

        let err = recorder
            .record("../escape", stream::iter(chunked(b"ignored", 4)))
            .await
            .unwrap_err();

        assert!(matches!(err, RecordingError::InvalidIdentifier(_)));
    }

    #[test(start_paused = true)]
    async fn test_session_limit_times_out() {
        let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
        let mut config = WebrecConfig::for_testing(scratch_dir.clone(), recordings_dir.clone());
        config.recording.idle_timeout = Duration::from_secs(600);
        config.recording.max_session_duration = Duration::from_secs(1);
        let recorder = Recorder::from_config(&config);
        // One header byte every 100ms: far slower than the limit allows
        let header = WebmFixture::new().header_bytes();
        let body = Box::pin(stream::unfold(0usize, move |index| {
            let byte = header.get(index).copied();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Some((Ok(Bytes::from(vec![byte?])), index + 1))
            }
        }));

        let err = recorder.record("slow", body).await.unwrap_err();

        assert!(matches!(err, RecordingError::TimedOut { .. }));
        assert_eq!(count_entries(&recordings_dir), 0);
        assert_eq!(count_entries(&scratch_dir), 0);
    }
}
