//! Header parsing: EBML header, then Segment children up to the end of
//! Tracks.

use std::io::Read;

use tracing::trace;

use super::header::{
    AudioSettings, ContainerHeader, EbmlHeader, Info, RawElement, SeekEntry, SeekHead, TrackEntry,
    Tracks, VideoSettings,
};
use crate::ebml::{EbmlError, EbmlReader, ElementHeader, ids};

/// Why the container header could not be extracted.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// More bytes are needed. Never escapes the extractor.
    #[error("Header incomplete")]
    Incomplete,

    /// Input ended for good before Tracks were fully read.
    #[error("Stream ended after {received} bytes, before track descriptors were complete")]
    Truncated {
        /// Bytes received in total
        received: usize,
    },

    /// Bytes that are not a valid WebM header.
    #[error("Malformed container at offset {offset}: {reason}")]
    Malformed {
        /// Stream offset of the problem
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// EBML document that is neither WebM nor Matroska.
    #[error("Unsupported DocType: {doc_type:?}")]
    UnsupportedDocType {
        /// DocType found in the EBML header
        doc_type: String,
    },

    /// Header did not finish within the configured byte budget.
    #[error("Header exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit
        limit: usize,
    },
}

impl HeaderError {
    fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        HeaderError::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<EbmlError> for HeaderError {
    fn from(err: EbmlError) -> Self {
        match err {
            EbmlError::Truncated { .. } => HeaderError::Incomplete,
            EbmlError::Invalid { offset, reason } => HeaderError::Malformed { offset, reason },
            EbmlError::Io(e) => HeaderError::malformed(0, e.to_string()),
        }
    }
}

/// Parses the container header and stops right after Tracks.
///
/// On success the reader is positioned at the first byte following the
/// Tracks element; that offset is the header length. Elements between the
/// EBML header and Tracks that webrec does not model are skipped.
///
/// # Errors
///
/// - `HeaderError::Incomplete` - Input ended before Tracks were read
/// - `HeaderError::Malformed` - Invalid EBML, wrong element order, or a
///   Cluster before Tracks
/// - `HeaderError::UnsupportedDocType` - DocType is not webm or matroska
pub fn parse_header<R: Read>(reader: &mut EbmlReader<R>) -> Result<ContainerHeader, HeaderError> {
    let first = next_header(reader)?;
    if first.id != ids::EBML {
        return Err(HeaderError::malformed(
            first.offset,
            format!("expected EBML header, found element 0x{:X}", first.id),
        ));
    }
    let ebml = parse_ebml_header(reader, first.known_size()?)?;
    if !matches!(ebml.doc_type.as_str(), "webm" | "matroska") {
        return Err(HeaderError::UnsupportedDocType {
            doc_type: ebml.doc_type,
        });
    }

    let segment = loop {
        let element = next_header(reader)?;
        match element.id {
            ids::SEGMENT => break element,
            ids::VOID | ids::CRC32 => reader.skip(element.known_size()?)?,
            other => {
                return Err(HeaderError::malformed(
                    element.offset,
                    format!("expected Segment, found element 0x{other:X}"),
                ));
            }
        }
    };

    let mut seek_head = None;
    let mut info = None;
    loop {
        if segment.end().is_some_and(|end| reader.position() >= end) {
            return Err(HeaderError::malformed(
                reader.position(),
                "Segment ended before Tracks",
            ));
        }

        let element = next_header(reader)?;
        match element.id {
            ids::SEEK_HEAD => seek_head = Some(parse_seek_head(reader, element.known_size()?)?),
            ids::INFO => info = Some(parse_info(reader, element.known_size()?)?),
            ids::TRACKS => {
                let tracks = parse_tracks(reader, element.known_size()?)?;
                let info = info
                    .ok_or_else(|| HeaderError::malformed(element.offset, "Tracks before Info"))?;
                return Ok(ContainerHeader {
                    ebml,
                    seek_head,
                    info,
                    tracks,
                });
            }
            ids::CLUSTER => {
                return Err(HeaderError::malformed(
                    element.offset,
                    "Cluster before track descriptors",
                ));
            }
            other => {
                let size = element.known_size()?;
                trace!(id = other, size, "Skipping segment element");
                reader.skip(size)?;
            }
        }
    }
}

fn next_header<R: Read>(reader: &mut EbmlReader<R>) -> Result<ElementHeader, HeaderError> {
    reader
        .read_element_header()?
        .ok_or(HeaderError::Incomplete)
}

/// Walks the children of a master element whose payload starts at the
/// current position. `visit` must consume each child's payload exactly.
fn for_each_child<R, F>(
    reader: &mut EbmlReader<R>,
    size: u64,
    mut visit: F,
) -> Result<(), HeaderError>
where
    R: Read,
    F: FnMut(&mut EbmlReader<R>, u32, u64) -> Result<(), HeaderError>,
{
    let end = reader.position() + size;
    while reader.position() < end {
        let child = next_header(reader)?;
        let child_size = child.known_size()?;
        let child_end = child.data_offset() + child_size;
        if child_end > end {
            return Err(HeaderError::malformed(
                child.offset,
                format!("element 0x{:X} overruns its parent", child.id),
            ));
        }
        visit(reader, child.id, child_size)?;
        if reader.position() != child_end {
            return Err(HeaderError::malformed(
                child.offset,
                format!("element 0x{:X} has inconsistent size", child.id),
            ));
        }
    }
    Ok(())
}

fn read_raw<R: Read>(
    reader: &mut EbmlReader<R>,
    id: u32,
    size: u64,
) -> Result<RawElement, HeaderError> {
    Ok(RawElement {
        id,
        payload: reader.read_binary(size)?,
    })
}

fn parse_ebml_header<R: Read>(
    reader: &mut EbmlReader<R>,
    size: u64,
) -> Result<EbmlHeader, HeaderError> {
    let mut header = EbmlHeader {
        doc_type: String::new(),
        ..Default::default()
    };
    for_each_child(reader, size, |reader, id, size| {
        match id {
            ids::EBML_VERSION => header.version = reader.read_uint(size)?,
            ids::EBML_READ_VERSION => header.read_version = reader.read_uint(size)?,
            ids::EBML_MAX_ID_LENGTH => header.max_id_length = reader.read_uint(size)?,
            ids::EBML_MAX_SIZE_LENGTH => header.max_size_length = reader.read_uint(size)?,
            ids::DOC_TYPE => header.doc_type = reader.read_string(size)?,
            ids::DOC_TYPE_VERSION => header.doc_type_version = reader.read_uint(size)?,
            ids::DOC_TYPE_READ_VERSION => header.doc_type_read_version = reader.read_uint(size)?,
            _ => reader.skip(size)?,
        }
        Ok(())
    })?;
    Ok(header)
}

fn parse_seek_head<R: Read>(
    reader: &mut EbmlReader<R>,
    size: u64,
) -> Result<SeekHead, HeaderError> {
    let mut seek_head = SeekHead::default();
    for_each_child(reader, size, |reader, id, size| {
        if id != ids::SEEK {
            return Ok(reader.skip(size)?);
        }
        let mut entry = SeekEntry { id: 0, position: 0 };
        for_each_child(reader, size, |reader, id, size| {
            match id {
                ids::SEEK_ID => {
                    let raw = reader.read_binary(size)?;
                    entry.id = raw
                        .iter()
                        .take(4)
                        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
                }
                ids::SEEK_POSITION => entry.position = reader.read_uint(size)?,
                _ => reader.skip(size)?,
            }
            Ok(())
        })?;
        seek_head.entries.push(entry);
        Ok(())
    })?;
    Ok(seek_head)
}

fn parse_info<R: Read>(reader: &mut EbmlReader<R>, size: u64) -> Result<Info, HeaderError> {
    let start = reader.position();
    let mut info = Info::default();
    for_each_child(reader, size, |reader, id, size| {
        match id {
            ids::TIMECODE_SCALE => info.timecode_scale = reader.read_uint(size)?,
            ids::DURATION => info.duration = Some(reader.read_float(size)?),
            ids::DATE_UTC => info.date_utc = Some(reader.read_int(size)?),
            ids::TITLE => info.title = Some(reader.read_string(size)?),
            ids::MUXING_APP => info.muxing_app = Some(reader.read_string(size)?),
            ids::WRITING_APP => info.writing_app = Some(reader.read_string(size)?),
            ids::SEGMENT_UID => info.segment_uid = Some(reader.read_binary(size)?),
            ids::VOID | ids::CRC32 => reader.skip(size)?,
            other => info.unknown.push(read_raw(reader, other, size)?),
        }
        Ok(())
    })?;

    if info.timecode_scale == 0 {
        return Err(HeaderError::malformed(start, "TimecodeScale of zero"));
    }
    Ok(info)
}

fn parse_tracks<R: Read>(reader: &mut EbmlReader<R>, size: u64) -> Result<Tracks, HeaderError> {
    let mut tracks = Tracks::default();
    for_each_child(reader, size, |reader, id, size| {
        if id == ids::TRACK_ENTRY {
            tracks.entries.push(parse_track_entry(reader, size)?);
        } else {
            reader.skip(size)?;
        }
        Ok(())
    })?;
    Ok(tracks)
}

fn parse_track_entry<R: Read>(
    reader: &mut EbmlReader<R>,
    size: u64,
) -> Result<TrackEntry, HeaderError> {
    let mut entry = TrackEntry::default();
    for_each_child(reader, size, |reader, id, size| {
        match id {
            ids::TRACK_NUMBER => entry.number = reader.read_uint(size)?,
            ids::TRACK_UID => entry.uid = Some(reader.read_uint(size)?),
            ids::TRACK_TYPE => entry.track_type = reader.read_uint(size)?,
            ids::CODEC_ID => entry.codec_id = reader.read_string(size)?,
            ids::CODEC_PRIVATE => entry.codec_private = Some(reader.read_binary(size)?),
            ids::CODEC_NAME => entry.codec_name = Some(reader.read_string(size)?),
            ids::NAME => entry.name = Some(reader.read_string(size)?),
            ids::LANGUAGE => entry.language = Some(reader.read_string(size)?),
            ids::DEFAULT_DURATION => entry.default_duration = Some(reader.read_uint(size)?),
            ids::CODEC_DELAY => entry.codec_delay = Some(reader.read_uint(size)?),
            ids::SEEK_PRE_ROLL => entry.seek_pre_roll = Some(reader.read_uint(size)?),
            ids::FLAG_ENABLED => entry.flag_enabled = Some(reader.read_uint(size)?),
            ids::FLAG_DEFAULT => entry.flag_default = Some(reader.read_uint(size)?),
            ids::FLAG_FORCED => entry.flag_forced = Some(reader.read_uint(size)?),
            ids::FLAG_LACING => entry.flag_lacing = Some(reader.read_uint(size)?),
            ids::VIDEO => entry.video = Some(parse_video(reader, size)?),
            ids::AUDIO => entry.audio = Some(parse_audio(reader, size)?),
            ids::VOID | ids::CRC32 => reader.skip(size)?,
            other => entry.unknown.push(read_raw(reader, other, size)?),
        }
        Ok(())
    })?;
    Ok(entry)
}

fn parse_video<R: Read>(
    reader: &mut EbmlReader<R>,
    size: u64,
) -> Result<VideoSettings, HeaderError> {
    let mut video = VideoSettings::default();
    for_each_child(reader, size, |reader, id, size| {
        match id {
            ids::PIXEL_WIDTH => video.pixel_width = reader.read_uint(size)?,
            ids::PIXEL_HEIGHT => video.pixel_height = reader.read_uint(size)?,
            ids::VOID | ids::CRC32 => reader.skip(size)?,
            other => video.unknown.push(read_raw(reader, other, size)?),
        }
        Ok(())
    })?;
    Ok(video)
}

fn parse_audio<R: Read>(
    reader: &mut EbmlReader<R>,
    size: u64,
) -> Result<AudioSettings, HeaderError> {
    let mut audio = AudioSettings::default();
    for_each_child(reader, size, |reader, id, size| {
        match id {
            ids::SAMPLING_FREQUENCY => audio.sampling_frequency = reader.read_float(size)?,
            ids::CHANNELS => audio.channels = reader.read_uint(size)?,
            ids::BIT_DEPTH => audio.bit_depth = Some(reader.read_uint(size)?),
            ids::VOID | ids::CRC32 => reader.skip(size)?,
            other => audio.unknown.push(read_raw(reader, other, size)?),
        }
        Ok(())
    })?;
    Ok(audio)
}
