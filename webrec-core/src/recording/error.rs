//! Session-level error taxonomy.

use std::time::Duration;

use super::duration::DurationError;
use super::identifier::{InvalidRecordingId, RecordingId};
use crate::container::HeaderError;
use crate::ebml::SerializationError;
use crate::storage::StorageError;

/// Why a recording session produced no artifact.
///
/// A peer reset during the media phase is not an error; it finalizes
/// normally and is reported through [`super::IngestEnd`].
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Invalid recording identifier: {0}")]
    InvalidIdentifier(#[from] InvalidRecordingId),

    #[error("Recording {id} is already in progress")]
    InProgress { id: RecordingId },

    #[error("Request body was empty")]
    EmptyStream,

    /// Peer went away before the header was complete.
    #[error("Stream aborted after {received} bytes, before any media: {reason}")]
    AbortedBeforeMedia { reason: String, received: usize },

    #[error("Malformed container: {0}")]
    MalformedContainer(#[from] HeaderError),

    /// Non-reset failure reading the request body.
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Duration unavailable: {0}")]
    Duration(#[from] DurationError),

    #[error("Storage fault: {0}")]
    Storage(#[from] StorageError),

    #[error("Header serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Session exceeded {limit:?}")]
    TimedOut { limit: Duration },

    /// Blocking finalize work panicked or was cancelled.
    #[error("Finalize task failed: {reason}")]
    TaskFailed { reason: String },
}

impl RecordingError {
    /// True when the client sent something unusable, as opposed to a
    /// server-side fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            RecordingError::InvalidIdentifier(_)
            | RecordingError::InProgress { .. }
            | RecordingError::EmptyStream
            | RecordingError::AbortedBeforeMedia { .. }
            | RecordingError::MalformedContainer(_)
            | RecordingError::Transport { .. }
            | RecordingError::TimedOut { .. } => true,
            RecordingError::Duration(e) => !matches!(e, DurationError::Invalid(_)),
            RecordingError::Storage(_)
            | RecordingError::Serialization(_)
            | RecordingError::TaskFailed { .. } => false,
        }
    }

    /// True when the recording had no usable media at all.
    pub fn is_empty_recording(&self) -> bool {
        match self {
            RecordingError::EmptyStream => true,
            RecordingError::Duration(e) => e.is_empty_recording(),
            _ => false,
        }
    }

    /// True when the peer simply left; logged at info rather than error.
    pub fn is_peer_abort(&self) -> bool {
        matches!(self, RecordingError::AbortedBeforeMedia { .. })
    }
}
