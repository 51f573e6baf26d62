//! webrec core - streaming WebM ingest and finalization
//!
//! Accepts a live, open-ended WebM stream as it is produced by a browser
//! recorder and turns it into a seekable file with a correct duration:
//! the header is parsed up to Tracks, media bytes are captured verbatim,
//! the duration is computed and injected, and header plus media are merged
//! atomically into the recordings directory.

pub mod config;
pub mod container;
pub mod ebml;
pub mod recording;
pub mod storage;
pub mod tracing_setup;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

// Re-export main types for convenient access
pub use config::WebrecConfig;
pub use container::{ContainerHeader, HeaderError};
pub use recording::{
    DurationStrategy, IngestEnd, Recorder, RecordingError, RecordingId, RecordingOutcome,
    TransportFault,
};
pub use storage::{RecordingStorage, StorageError};
