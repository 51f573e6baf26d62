//! Test fixtures for recording pipeline tests.
//!
//! Builds synthetic WebM streams shaped like browser MediaRecorder output
//! (unknown-size Segment, VP8 + Opus tracks) and provides scratch/recordings
//! directory setup.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::container::{ContainerHeader, parse_header};
use crate::ebml::{EbmlReader, ElementWriter, SerializationError, ids};
use crate::recording::TransportFault;

// Type alias for complex return type
type TempStorageDirs = (tempfile::TempDir, PathBuf, PathBuf);

/// Builder for synthetic WebM byte streams.
#[derive(Debug, Clone)]
pub struct WebmFixture {
    doc_type: String,
    include_tracks: bool,
    unknown_size_clusters: bool,
    block_groups: bool,
    extra_track_elements: Vec<(u32, Vec<u8>)>,
    clusters: Vec<(u64, Vec<i16>)>,
}

impl Default for WebmFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl WebmFixture {
    /// WebM with one video and one audio track and no clusters.
    pub fn new() -> Self {
        Self {
            doc_type: "webm".to_string(),
            include_tracks: true,
            unknown_size_clusters: false,
            block_groups: false,
            extra_track_elements: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_type = doc_type.to_string();
        self
    }

    /// Omits the Tracks element entirely.
    pub fn without_tracks(mut self) -> Self {
        self.include_tracks = false;
        self
    }

    /// Writes clusters with the unknown-size marker, as Chrome does.
    pub fn unknown_size_clusters(mut self) -> Self {
        self.unknown_size_clusters = true;
        self
    }

    /// Wraps blocks in BlockGroup/Block instead of SimpleBlock.
    pub fn block_groups(mut self) -> Self {
        self.block_groups = true;
        self
    }

    /// Adds an element the parser does not model to the video TrackEntry.
    pub fn extra_track_element(mut self, id: u32, payload: &[u8]) -> Self {
        self.extra_track_elements.push((id, payload.to_vec()));
        self
    }

    /// Appends a cluster with the given base timecode and block offsets.
    pub fn cluster(mut self, timecode: u64, block_timecodes: &[i16]) -> Self {
        self.clusters.push((timecode, block_timecodes.to_vec()));
        self
    }

    /// EBML header, open Segment, SeekHead, Void, Info and Tracks.
    ///
    /// # Panics
    ///
    /// Panics if the fixture cannot be encoded, which indicates a bug in
    /// the fixture itself.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut writer = ElementWriter::new();
        writer
            .write_master(ids::EBML, |ebml| {
                ebml.write_uint(ids::EBML_VERSION, 1)?;
                ebml.write_uint(ids::EBML_READ_VERSION, 1)?;
                ebml.write_uint(ids::EBML_MAX_ID_LENGTH, 4)?;
                ebml.write_uint(ids::EBML_MAX_SIZE_LENGTH, 8)?;
                ebml.write_string(ids::DOC_TYPE, &self.doc_type)?;
                ebml.write_uint(ids::DOC_TYPE_VERSION, 4)?;
                ebml.write_uint(ids::DOC_TYPE_READ_VERSION, 2)
            })
            .unwrap();
        writer.write_unknown_size_header(ids::SEGMENT).unwrap();
        writer
            .write_master(ids::SEEK_HEAD, |seek_head| {
                seek_head.write_master(ids::SEEK, |seek| {
                    seek.write_binary(ids::SEEK_ID, &ids::INFO.to_be_bytes())?;
                    seek.write_uint(ids::SEEK_POSITION, 64)
                })
            })
            .unwrap();
        writer.write_binary(ids::VOID, &[0; 4]).unwrap();
        writer
            .write_master(ids::INFO, |info| {
                info.write_uint(ids::TIMECODE_SCALE, 1_000_000)?;
                info.write_int(ids::DATE_UTC, 810_000_000_000_000_000)?;
                info.write_string(ids::MUXING_APP, "webrec-fixture")?;
                info.write_string(ids::WRITING_APP, "webrec-fixture")
            })
            .unwrap();
        if self.include_tracks {
            writer
                .write_master(ids::TRACKS, |tracks| {
                    tracks.write_master(ids::TRACK_ENTRY, |video| {
                        video.write_uint(ids::TRACK_NUMBER, 1)?;
                        video.write_uint(ids::TRACK_UID, 0x1111)?;
                        video.write_uint(ids::TRACK_TYPE, 1)?;
                        video.write_string(ids::CODEC_ID, "V_VP8")?;
                        video.write_master(ids::VIDEO, |settings| {
                            settings.write_uint(ids::PIXEL_WIDTH, 640)?;
                            settings.write_uint(ids::PIXEL_HEIGHT, 480)
                        })?;
                        for (id, payload) in &self.extra_track_elements {
                            video.write_binary(*id, payload)?;
                        }
                        Ok(())
                    })?;
                    tracks.write_master(ids::TRACK_ENTRY, |audio| {
                        audio.write_uint(ids::TRACK_NUMBER, 2)?;
                        audio.write_uint(ids::TRACK_UID, 0x2222)?;
                        audio.write_uint(ids::TRACK_TYPE, 2)?;
                        audio.write_string(ids::CODEC_ID, "A_OPUS")?;
                        audio.write_binary(ids::CODEC_PRIVATE, b"OpusHead\x01\x02\x38\x01")?;
                        audio.write_uint(ids::CODEC_DELAY, 6_500_000)?;
                        audio.write_uint(ids::SEEK_PRE_ROLL, 80_000_000)?;
                        audio.write_master(ids::AUDIO, |settings| {
                            settings.write_float(ids::SAMPLING_FREQUENCY, 48_000.0)?;
                            settings.write_uint(ids::CHANNELS, 2)
                        })
                    })
                })
                .unwrap();
        }
        writer.into_bytes()
    }

    /// Encoded bytes of cluster `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn cluster_bytes(&self, index: usize) -> Vec<u8> {
        let (timecode, blocks) = &self.clusters[index];
        let mut writer = ElementWriter::new();
        let write_children = |out: &mut ElementWriter| -> Result<(), SerializationError> {
            out.write_uint(ids::TIMECODE, *timecode)?;
            for (position, block_timecode) in blocks.iter().enumerate() {
                let payload = block_payload(*block_timecode, index, position);
                if self.block_groups {
                    out.write_master(ids::BLOCK_GROUP, |group| {
                        group.write_binary(ids::BLOCK, &payload)
                    })?;
                } else {
                    out.write_binary(ids::SIMPLE_BLOCK, &payload)?;
                }
            }
            Ok(())
        };

        if self.unknown_size_clusters {
            writer.write_unknown_size_header(ids::CLUSTER).unwrap();
            write_children(&mut writer).unwrap();
        } else {
            writer.write_master(ids::CLUSTER, write_children).unwrap();
        }
        writer.into_bytes()
    }

    /// All clusters, in order: what the media buffer should capture.
    pub fn media_bytes(&self) -> Vec<u8> {
        (0..self.clusters.len())
            .flat_map(|index| self.cluster_bytes(index))
            .collect()
    }

    /// Complete stream: header followed by media.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header_bytes();
        bytes.extend(self.media_bytes());
        bytes
    }
}

/// SimpleBlock/Block payload: track 1, timecode, keyframe flag on the first
/// block of a cluster, then a recognizable body.
fn block_payload(timecode: i16, cluster: usize, position: usize) -> Vec<u8> {
    let mut payload = vec![0x81];
    payload.extend_from_slice(&timecode.to_be_bytes());
    payload.push(if position == 0 { 0x80 } else { 0x00 });
    payload.extend((0..24u8).map(|i| i ^ (cluster as u8).wrapping_mul(31) ^ position as u8));
    payload
}

/// Creates a temporary root with `scratch` and `recordings` subdirectories.
///
/// # Panics
///
/// Panics if temporary directory creation fails. This is acceptable in test
/// fixtures where failures indicate environment issues.
pub fn create_temp_storage_dirs() -> TempStorageDirs {
    let temp_dir = tempfile::tempdir().unwrap();
    let scratch_dir = temp_dir.path().join("scratch");
    let recordings_dir = temp_dir.path().join("recordings");

    std::fs::create_dir_all(&scratch_dir).unwrap();

    (temp_dir, scratch_dir, recordings_dir)
}

/// Splits `bytes` into body chunks of at most `chunk_size` bytes.
pub fn chunked(bytes: &[u8], chunk_size: usize) -> Vec<Result<Bytes, TransportFault>> {
    bytes
        .chunks(chunk_size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

/// Reads a stored recording back as header plus trailing media bytes.
///
/// # Panics
///
/// Panics if the file cannot be read or its header does not parse.
pub fn read_recording(path: &Path) -> (ContainerHeader, Vec<u8>) {
    let bytes = std::fs::read(path).unwrap();
    let mut reader = EbmlReader::new(&bytes[..]);
    let header = parse_header(&mut reader).unwrap();
    let media = bytes[reader.position() as usize..].to_vec();
    (header, media)
}

/// Number of entries directly inside `dir` (0 if it does not exist).
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}
