//! Recording identifiers taken from the request path.

use std::fmt;
use std::str::FromStr;

/// Longest identifier accepted.
pub const MAX_ID_LENGTH: usize = 128;

/// Validated recording identifier.
///
/// Identifiers become file names inside the recordings directory, so only a
/// conservative character set is accepted and leading dots are refused. No
/// path separators can appear, which rules out traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordingId(String);

/// Reasons an identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecordingId {
    #[error("Recording identifier is empty")]
    Empty,

    #[error("Recording identifier is {length} characters, limit is {MAX_ID_LENGTH}")]
    TooLong { length: usize },

    #[error("Recording identifier contains {character:?}")]
    InvalidCharacter { character: char },

    #[error("Recording identifier may not start with '.'")]
    HiddenName,
}

impl RecordingId {
    /// Validates `raw` as a recording identifier.
    ///
    /// # Errors
    ///
    /// - `InvalidRecordingId::Empty` - Empty string
    /// - `InvalidRecordingId::TooLong` - Longer than [`MAX_ID_LENGTH`]
    /// - `InvalidRecordingId::InvalidCharacter` - Anything outside
    ///   `[A-Za-z0-9._-]`
    /// - `InvalidRecordingId::HiddenName` - Starts with `.`
    pub fn parse(raw: &str) -> Result<Self, InvalidRecordingId> {
        if raw.is_empty() {
            return Err(InvalidRecordingId::Empty);
        }
        let length = raw.chars().count();
        if length > MAX_ID_LENGTH {
            return Err(InvalidRecordingId::TooLong { length });
        }
        if let Some(character) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(InvalidRecordingId::InvalidCharacter { character });
        }
        if raw.starts_with('.') {
            return Err(InvalidRecordingId::HiddenName);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the finalized recording.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.0)
    }
}

impl FromStr for RecordingId {
    type Err = InvalidRecordingId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
