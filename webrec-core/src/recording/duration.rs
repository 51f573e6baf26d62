//! Duration accounting for captured media.
//!
//! Two strategies: read block timestamps out of the captured clusters, or
//! measure how long the body took to arrive. Both yield TimecodeScale ticks.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::container::{Cluster, ClusterScanner};
use crate::ebml::EbmlError;

/// How Info.Duration is derived. One strategy applies to every session of a
/// deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DurationStrategy {
    /// Last block timestamp minus first block timestamp
    #[default]
    Content,
    /// Wall-clock time spent receiving the body
    Timing,
}

impl FromStr for DurationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "content" => Ok(DurationStrategy::Content),
            "timing" => Ok(DurationStrategy::Timing),
            _ => Err(format!("Invalid duration strategy: {s}")),
        }
    }
}

impl fmt::Display for DurationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationStrategy::Content => f.write_str("content"),
            DurationStrategy::Timing => f.write_str("timing"),
        }
    }
}

/// Why no duration could be produced.
#[derive(Debug, thiserror::Error)]
pub enum DurationError {
    #[error("No media bytes were received")]
    NoMedia,

    #[error("Media contains no complete blocks")]
    NoBlocks,

    #[error("Media could not be scanned: {0}")]
    Scan(#[from] EbmlError),

    #[error("Computed duration {0} is not a finite non-negative number")]
    Invalid(f64),
}

impl DurationError {
    /// True when the recording simply has nothing in it.
    pub fn is_empty_recording(&self) -> bool {
        matches!(self, DurationError::NoMedia | DurationError::NoBlocks)
    }
}

/// First and last block timestamps seen across clusters that hold blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimestampSpan {
    pub first: Option<i64>,
    pub last: Option<i64>,
    /// Clusters that contributed at least one block
    pub clusters: usize,
    pub blocks: usize,
}

impl TimestampSpan {
    /// Folds one cluster into the span. Clusters without blocks are ignored.
    pub fn observe(&mut self, cluster: &Cluster) {
        let (Some(first), Some(last)) = (cluster.first_timestamp(), cluster.last_timestamp())
        else {
            return;
        };
        self.first.get_or_insert(first);
        self.last = Some(last);
        self.clusters += 1;
        self.blocks += cluster.blocks.len();
    }

    /// Span length in ticks; `None` if no block was observed.
    ///
    /// A last timestamp earlier than the first clamps to zero.
    pub fn duration_ticks(&self) -> Option<u64> {
        let (first, last) = (self.first?, self.last?);
        if last < first {
            warn!(first, last, "Last block precedes first block, clamping duration to 0");
            return Some(0);
        }
        Some(last.abs_diff(first))
    }
}

/// Scans media bytes and collects the block timestamp span.
///
/// A truncated tail is tolerated. Malformed bytes after at least one
/// complete block end the scan with what was collected; malformed bytes
/// before any block are an error.
///
/// # Errors
///
/// - `DurationError::Scan` - Media is not EBML cluster data
pub fn scan_media<R: Read>(source: R) -> Result<TimestampSpan, DurationError> {
    let mut scanner = ClusterScanner::new(source);
    let mut span = TimestampSpan::default();

    for cluster in scanner.by_ref() {
        match cluster {
            Ok(cluster) => span.observe(&cluster),
            Err(e) if span.blocks > 0 => {
                warn!(error = %e, blocks = span.blocks, "Corrupt media tail ignored");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(offset) = scanner.truncated_at() {
        debug!(offset, "Media ended mid-element; trailing partial data ignored");
    }
    Ok(span)
}

/// Converts elapsed wall-clock time to ticks at millisecond resolution.
pub fn elapsed_ticks(elapsed: Duration, timecode_scale: u64) -> f64 {
    let nanos = elapsed.as_millis() as f64 * 1_000_000.0;
    nanos / timecode_scale.max(1) as f64
}

/// Produces the Info.Duration value for a finished capture.
#[derive(Debug, Clone, Copy)]
pub struct DurationCalculator {
    strategy: DurationStrategy,
    timecode_scale: u64,
}

impl DurationCalculator {
    pub fn new(strategy: DurationStrategy, timecode_scale: u64) -> Self {
        Self {
            strategy,
            timecode_scale,
        }
    }

    pub fn strategy(&self) -> DurationStrategy {
        self.strategy
    }

    /// Computes the duration in ticks for `media_len` bytes stored at
    /// `media_path`, received over `elapsed`.
    ///
    /// Reads the file for the content strategy, so call from a blocking
    /// context.
    ///
    /// # Errors
    ///
    /// - `DurationError::NoMedia` - `media_len` is zero
    /// - `DurationError::NoBlocks` - Content strategy found no complete block
    /// - `DurationError::Scan` - Media could not be read or is not cluster data
    /// - `DurationError::Invalid` - Result is not finite
    pub fn compute(
        &self,
        media_path: &Path,
        media_len: u64,
        elapsed: Duration,
    ) -> Result<f64, DurationError> {
        if media_len == 0 {
            return Err(DurationError::NoMedia);
        }

        let ticks = match self.strategy {
            DurationStrategy::Content => {
                let file = File::open(media_path).map_err(EbmlError::from)?;
                let span = scan_media(BufReader::new(file))?;
                let ticks = span.duration_ticks().ok_or(DurationError::NoBlocks)?;
                debug!(
                    clusters = span.clusters,
                    blocks = span.blocks,
                    ticks,
                    "Content duration computed"
                );
                ticks as f64
            }
            DurationStrategy::Timing => elapsed_ticks(elapsed, self.timecode_scale),
        };

        if !ticks.is_finite() || ticks < 0.0 {
            return Err(DurationError::Invalid(ticks));
        }
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::test_fixtures::WebmFixture;

    fn media_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_span_covers_first_to_last_block() {
        let media = WebmFixture::new()
            .cluster(0, &[0])
            .cluster(5000, &[0, 200])
            .media_bytes();

        let span = scan_media(&media[..]).unwrap();

        assert_eq!(span.first, Some(0));
        assert_eq!(span.last, Some(5200));
        assert_eq!(span.duration_ticks(), Some(5200));
        assert_eq!(span.clusters, 2);
        assert_eq!(span.blocks, 3);
    }

    #[test]
    fn test_empty_clusters_do_not_count() {
        let media = WebmFixture::new()
            .cluster(100, &[0])
            .cluster(400, &[50])
            .cluster(900, &[])
            .media_bytes();

        let span = scan_media(&media[..]).unwrap();

        assert_eq!(span.duration_ticks(), Some(350));
        assert_eq!(span.clusters, 2);
    }

    #[test]
    fn test_negative_span_clamps_to_zero() {
        let media = WebmFixture::new()
            .cluster(1000, &[0])
            .cluster(100, &[0])
            .media_bytes();

        assert_eq!(scan_media(&media[..]).unwrap().duration_ticks(), Some(0));
    }

    #[test]
    fn test_corrupt_tail_after_blocks_is_tolerated() {
        let mut media = WebmFixture::new()
            .cluster(0, &[0])
            .cluster(2000, &[40])
            .media_bytes();
        media.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let span = scan_media(&media[..]).unwrap();
        assert_eq!(span.duration_ticks(), Some(2040));
    }

    #[test]
    fn test_corrupt_tail_in_unknown_size_cluster_keeps_its_blocks() {
        let mut media = WebmFixture::new()
            .unknown_size_clusters()
            .cluster(0, &[0])
            .cluster(5000, &[0, 200])
            .media_bytes();
        media.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let span = scan_media(&media[..]).unwrap();
        assert_eq!(span.duration_ticks(), Some(5200));

        let mut single = WebmFixture::new()
            .unknown_size_clusters()
            .cluster(0, &[0, 200])
            .media_bytes();
        single.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let span = scan_media(&single[..]).unwrap();
        assert_eq!(span.duration_ticks(), Some(200));
    }

    #[test]
    fn test_garbage_without_blocks_is_an_error() {
        assert!(matches!(
            scan_media(&[0x00, 0x01, 0x02][..]),
            Err(DurationError::Scan(_))
        ));
    }

    #[test]
    fn test_content_strategy_reads_file() {
        let media = WebmFixture::new()
            .cluster(0, &[0])
            .cluster(5000, &[0, 200])
            .media_bytes();
        let file = media_file(&media);
        let calculator = DurationCalculator::new(DurationStrategy::Content, 1_000_000);

        let ticks = calculator
            .compute(file.path(), media.len() as u64, Duration::from_secs(99))
            .unwrap();

        assert_eq!(ticks, 5200.0);
    }

    #[test]
    fn test_content_strategy_without_blocks_is_empty() {
        let media = WebmFixture::new().cluster(0, &[]).media_bytes();
        let file = media_file(&media);
        let calculator = DurationCalculator::new(DurationStrategy::Content, 1_000_000);

        let err = calculator
            .compute(file.path(), media.len() as u64, Duration::ZERO)
            .unwrap_err();

        assert!(matches!(err, DurationError::NoBlocks));
        assert!(err.is_empty_recording());
    }

    #[test]
    fn test_no_media_is_empty_for_both_strategies() {
        for strategy in [DurationStrategy::Content, DurationStrategy::Timing] {
            let calculator = DurationCalculator::new(strategy, 1_000_000);
            let err = calculator
                .compute(Path::new("/nonexistent"), 0, Duration::from_secs(3))
                .unwrap_err();
            assert!(matches!(err, DurationError::NoMedia));
        }
    }

    #[test]
    fn test_timing_strategy_converts_to_ticks() {
        let calculator = DurationCalculator::new(DurationStrategy::Timing, 1_000_000);
        let ticks = calculator
            .compute(Path::new("/unused"), 10, Duration::from_millis(5200))
            .unwrap();
        assert_eq!(ticks, 5200.0);

        // 10 ms ticks
        assert_eq!(elapsed_ticks(Duration::from_millis(5200), 10_000_000), 520.0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Content".parse(), Ok(DurationStrategy::Content));
        assert_eq!("timing".parse(), Ok(DurationStrategy::Timing));
        assert!("wallclock".parse::<DurationStrategy>().is_err());
        assert_eq!(DurationStrategy::Timing.to_string(), "timing");
    }
}
