//! Header re-encoding.

use super::header::{
    AudioSettings, ContainerHeader, EbmlHeader, Info, RawElement, TrackEntry, VideoSettings,
};
use crate::ebml::{ElementWriter, SerializationError, ids};

impl ContainerHeader {
    /// Encodes the EBML header, an unknown-size Segment header, Info and
    /// Tracks.
    ///
    /// The output is a valid prefix for the buffered media bytes: clusters
    /// appended after it become children of the open Segment. The seek index
    /// and any Void/CRC-32 elements are not written.
    ///
    /// # Errors
    ///
    /// - `SerializationError::NonFiniteFloat` - Duration or sampling rate is
    ///   NaN or infinite
    /// - `SerializationError::InvalidElementId` - A preserved unknown element
    ///   carries a malformed ID
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        let mut writer = ElementWriter::new();
        write_ebml_header(&mut writer, &self.ebml)?;
        writer.write_unknown_size_header(ids::SEGMENT)?;
        write_info(&mut writer, &self.info)?;
        writer.write_master(ids::TRACKS, |tracks| {
            self.tracks
                .entries
                .iter()
                .try_for_each(|entry| write_track_entry(tracks, entry))
        })?;
        Ok(writer.into_bytes())
    }
}

fn write_ebml_header(
    writer: &mut ElementWriter,
    header: &EbmlHeader,
) -> Result<(), SerializationError> {
    writer.write_master(ids::EBML, |ebml| {
        ebml.write_uint(ids::EBML_VERSION, header.version)?;
        ebml.write_uint(ids::EBML_READ_VERSION, header.read_version)?;
        ebml.write_uint(ids::EBML_MAX_ID_LENGTH, header.max_id_length)?;
        ebml.write_uint(ids::EBML_MAX_SIZE_LENGTH, header.max_size_length)?;
        ebml.write_string(ids::DOC_TYPE, &header.doc_type)?;
        ebml.write_uint(ids::DOC_TYPE_VERSION, header.doc_type_version)?;
        ebml.write_uint(ids::DOC_TYPE_READ_VERSION, header.doc_type_read_version)
    })
}

fn write_info(writer: &mut ElementWriter, info: &Info) -> Result<(), SerializationError> {
    writer.write_master(ids::INFO, |out| {
        out.write_uint(ids::TIMECODE_SCALE, info.timecode_scale)?;
        if let Some(duration) = info.duration {
            out.write_float(ids::DURATION, duration)?;
        }
        if let Some(date) = info.date_utc {
            out.write_int(ids::DATE_UTC, date)?;
        }
        write_optional_string(out, ids::TITLE, info.title.as_deref())?;
        write_optional_string(out, ids::MUXING_APP, info.muxing_app.as_deref())?;
        write_optional_string(out, ids::WRITING_APP, info.writing_app.as_deref())?;
        if let Some(uid) = &info.segment_uid {
            out.write_binary(ids::SEGMENT_UID, uid)?;
        }
        write_raw_elements(out, &info.unknown)
    })
}

fn write_track_entry(
    writer: &mut ElementWriter,
    entry: &TrackEntry,
) -> Result<(), SerializationError> {
    writer.write_master(ids::TRACK_ENTRY, |out| {
        out.write_uint(ids::TRACK_NUMBER, entry.number)?;
        write_optional_uint(out, ids::TRACK_UID, entry.uid)?;
        out.write_uint(ids::TRACK_TYPE, entry.track_type)?;
        write_optional_uint(out, ids::FLAG_ENABLED, entry.flag_enabled)?;
        write_optional_uint(out, ids::FLAG_DEFAULT, entry.flag_default)?;
        write_optional_uint(out, ids::FLAG_FORCED, entry.flag_forced)?;
        write_optional_uint(out, ids::FLAG_LACING, entry.flag_lacing)?;
        write_optional_uint(out, ids::DEFAULT_DURATION, entry.default_duration)?;
        write_optional_string(out, ids::NAME, entry.name.as_deref())?;
        write_optional_string(out, ids::LANGUAGE, entry.language.as_deref())?;
        out.write_string(ids::CODEC_ID, &entry.codec_id)?;
        if let Some(private) = &entry.codec_private {
            out.write_binary(ids::CODEC_PRIVATE, private)?;
        }
        write_optional_string(out, ids::CODEC_NAME, entry.codec_name.as_deref())?;
        write_optional_uint(out, ids::CODEC_DELAY, entry.codec_delay)?;
        write_optional_uint(out, ids::SEEK_PRE_ROLL, entry.seek_pre_roll)?;
        if let Some(video) = &entry.video {
            write_video(out, video)?;
        }
        if let Some(audio) = &entry.audio {
            write_audio(out, audio)?;
        }
        write_raw_elements(out, &entry.unknown)
    })
}

fn write_video(
    writer: &mut ElementWriter,
    video: &VideoSettings,
) -> Result<(), SerializationError> {
    writer.write_master(ids::VIDEO, |out| {
        out.write_uint(ids::PIXEL_WIDTH, video.pixel_width)?;
        out.write_uint(ids::PIXEL_HEIGHT, video.pixel_height)?;
        write_raw_elements(out, &video.unknown)
    })
}

fn write_audio(
    writer: &mut ElementWriter,
    audio: &AudioSettings,
) -> Result<(), SerializationError> {
    writer.write_master(ids::AUDIO, |out| {
        out.write_float(ids::SAMPLING_FREQUENCY, audio.sampling_frequency)?;
        out.write_uint(ids::CHANNELS, audio.channels)?;
        write_optional_uint(out, ids::BIT_DEPTH, audio.bit_depth)?;
        write_raw_elements(out, &audio.unknown)
    })
}

fn write_optional_uint(
    writer: &mut ElementWriter,
    id: u32,
    value: Option<u64>,
) -> Result<(), SerializationError> {
    match value {
        Some(value) => writer.write_uint(id, value),
        None => Ok(()),
    }
}

fn write_optional_string(
    writer: &mut ElementWriter,
    id: u32,
    value: Option<&str>,
) -> Result<(), SerializationError> {
    match value {
        Some(value) => writer.write_string(id, value),
        None => Ok(()),
    }
}

fn write_raw_elements(
    writer: &mut ElementWriter,
    elements: &[RawElement],
) -> Result<(), SerializationError> {
    elements
        .iter()
        .try_for_each(|raw| writer.write_binary(raw.id, &raw.payload))
}
