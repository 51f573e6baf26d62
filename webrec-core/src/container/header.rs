//! Container header types: everything in front of the first media byte.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Seconds between the Unix epoch and the Matroska epoch (2001-01-01 UTC).
const MATROSKA_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Default TimecodeScale: one tick is one millisecond.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// File-level EBML header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EbmlHeader {
    pub version: u64,
    pub read_version: u64,
    pub max_id_length: u64,
    pub max_size_length: u64,
    pub doc_type: String,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
}

impl Default for EbmlHeader {
    fn default() -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: 4,
            max_size_length: 8,
            doc_type: "webm".to_string(),
            doc_type_version: 2,
            doc_type_read_version: 2,
        }
    }
}

/// One SeekHead entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeekEntry {
    pub id: u32,
    pub position: u64,
}

/// Seek index. Parsed for inspection but never written back, since its
/// positions no longer hold once the header is re-encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeekHead {
    pub entries: Vec<SeekEntry>,
}

/// Element webrec does not model, kept as ID plus payload so it can be
/// written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub id: u32,
    pub payload: Bytes,
}

/// Segment information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    /// Nanoseconds per tick
    pub timecode_scale: u64,
    /// Total duration in ticks; unset until the recording is finalized
    pub duration: Option<f64>,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC
    pub date_utc: Option<i64>,
    pub title: Option<String>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
    #[serde(skip)]
    pub segment_uid: Option<Bytes>,
    #[serde(skip)]
    pub unknown: Vec<RawElement>,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            date_utc: None,
            title: None,
            muxing_app: None,
            writing_app: None,
            segment_uid: None,
            unknown: Vec::new(),
        }
    }
}

impl Info {
    /// Duration converted to milliseconds, if set.
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration
            .map(|ticks| ticks * self.timecode_scale as f64 / 1_000_000.0)
    }

    /// Recording start time from DateUTC.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        let nanos = self.date_utc?;
        let secs = nanos.div_euclid(1_000_000_000) + MATROSKA_EPOCH_OFFSET_SECS;
        let subsec = nanos.rem_euclid(1_000_000_000) as u32;
        DateTime::from_timestamp(secs, subsec)
    }
}

/// Video track settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoSettings {
    pub pixel_width: u64,
    pub pixel_height: u64,
    #[serde(skip)]
    pub unknown: Vec<RawElement>,
}

/// Audio track settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub channels: u64,
    pub bit_depth: Option<u64>,
    #[serde(skip)]
    pub unknown: Vec<RawElement>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: 8000.0,
            channels: 1,
            bit_depth: None,
            unknown: Vec::new(),
        }
    }
}

/// Track descriptor.
///
/// Optional flags stay `None` when absent so a re-encoded header carries
/// exactly what the muxer wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackEntry {
    pub number: u64,
    pub uid: Option<u64>,
    pub track_type: u64,
    pub codec_id: String,
    #[serde(skip)]
    pub codec_private: Option<Bytes>,
    pub codec_name: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub default_duration: Option<u64>,
    pub codec_delay: Option<u64>,
    pub seek_pre_roll: Option<u64>,
    pub flag_enabled: Option<u64>,
    pub flag_default: Option<u64>,
    pub flag_forced: Option<u64>,
    pub flag_lacing: Option<u64>,
    pub video: Option<VideoSettings>,
    pub audio: Option<AudioSettings>,
    #[serde(skip)]
    pub unknown: Vec<RawElement>,
}

impl TrackEntry {
    pub const TYPE_VIDEO: u64 = 1;
    pub const TYPE_AUDIO: u64 = 2;

    /// Human-readable track kind.
    pub fn kind(&self) -> &'static str {
        match self.track_type {
            Self::TYPE_VIDEO => "video",
            Self::TYPE_AUDIO => "audio",
            _ => "other",
        }
    }
}

/// Track descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tracks {
    pub entries: Vec<TrackEntry>,
}

/// Everything the header extractor reads before media starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerHeader {
    pub ebml: EbmlHeader,
    pub seek_head: Option<SeekHead>,
    pub info: Info,
    pub tracks: Tracks,
}

impl ContainerHeader {
    /// File extension matching the DocType.
    pub fn extension(&self) -> &'static str {
        match self.ebml.doc_type.as_str() {
            "matroska" => "mkv",
            _ => "webm",
        }
    }

    /// Compares the metadata that survives re-encoding.
    ///
    /// The seek index is not written back, so it is excluded.
    pub fn same_metadata(&self, other: &ContainerHeader) -> bool {
        self.ebml == other.ebml && self.info == other.info && self.tracks == other.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_respects_timecode_scale() {
        let mut info = Info {
            duration: Some(5200.0),
            ..Default::default()
        };
        assert_eq!(info.duration_ms(), Some(5200.0));

        info.timecode_scale = 500_000;
        assert_eq!(info.duration_ms(), Some(2600.0));
    }

    #[test]
    fn test_recorded_at_uses_matroska_epoch() {
        let info = Info {
            date_utc: Some(0),
            ..Default::default()
        };
        let recorded = info.recorded_at().unwrap();
        assert_eq!(recorded.to_rfc3339(), "2001-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_extension_follows_doc_type() {
        let mut header = ContainerHeader {
            ebml: EbmlHeader::default(),
            seek_head: None,
            info: Info::default(),
            tracks: Tracks::default(),
        };
        assert_eq!(header.extension(), "webm");

        header.ebml.doc_type = "matroska".to_string();
        assert_eq!(header.extension(), "mkv");
    }
}
