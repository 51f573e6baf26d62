//! Transport-neutral view of the inbound byte stream.
//!
//! The HTTP layer classifies its own errors into [`TransportFault`]; the
//! pipeline only ever sees these two cases.

use serde::Serialize;

/// Error surfaced by the request body stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFault {
    /// The peer aborted the transfer (closed tab, refreshed page, lost
    /// connection). Bytes received so far are valid.
    #[error("Peer reset the stream: {reason}")]
    Reset { reason: String },

    /// Any other failure reading the body.
    #[error("Transport failure: {reason}")]
    Fatal { reason: String },
}

impl TransportFault {
    pub fn reset(reason: impl Into<String>) -> Self {
        TransportFault::Reset {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        TransportFault::Fatal {
            reason: reason.into(),
        }
    }
}

/// How the media phase ended. All three are successful terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestEnd {
    /// Body ended normally
    Completed,
    /// Peer reset the stream mid-media
    Reset,
    /// No bytes arrived within the idle timeout
    Stalled,
}
