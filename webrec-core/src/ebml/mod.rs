//! EBML element codec.
//!
//! Reads and writes the tag-length-value encoding underneath WebM and
//! Matroska. Element IDs keep their VINT length marker, sizes have it
//! stripped, and an all-ones size means "unknown" (used by live streams for
//! the Segment and, with some muxers, for Clusters).

pub mod ids;
pub mod reader;
pub mod writer;

pub use reader::{EbmlReader, ElementHeader};
pub use writer::{ElementWriter, SerializationError};

/// Errors produced while decoding EBML data.
#[derive(Debug, thiserror::Error)]
pub enum EbmlError {
    /// Input ended in the middle of an element.
    ///
    /// For incremental parsing this means "feed more bytes"; for a finished
    /// stream it means the tail was cut off.
    #[error("Input truncated at offset {offset}")]
    Truncated {
        /// Stream offset where the missing bytes were expected
        offset: u64,
    },

    /// Bytes that cannot be valid EBML.
    #[error("Invalid EBML at offset {offset}: {reason}")]
    Invalid {
        /// Stream offset of the offending element
        offset: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Underlying reader failed for a reason other than end of input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EbmlError {
    /// Returns true when more input could turn this into a successful parse.
    pub fn is_truncated(&self) -> bool {
        matches!(self, EbmlError::Truncated { .. })
    }

    pub(crate) fn invalid(offset: u64, reason: impl Into<String>) -> Self {
        EbmlError::Invalid {
            offset,
            reason: reason.into(),
        }
    }
}

/// Size value reserved for elements of unknown length (8-byte encoding).
pub const UNKNOWN_SIZE: u64 = (1 << 56) - 1;

/// Largest size a VINT can carry without colliding with the unknown marker.
pub const MAX_KNOWN_SIZE: u64 = UNKNOWN_SIZE - 1;
