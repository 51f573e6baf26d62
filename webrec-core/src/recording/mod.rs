//! Recording pipeline.
//!
//! A session runs three phases in order over one request body:
//! header extraction, verbatim media capture into a scratch sink, then
//! duration accounting and the header/media merge into the final file.
//! Transport details stay outside; the body arrives as a stream of
//! `Result<Bytes, TransportFault>`.

pub mod duration;
pub mod error;
pub mod extractor;
pub mod identifier;
pub mod media_buffer;
pub mod offline;
pub mod registry;
pub mod session;
pub mod transport;

pub use duration::{
    DurationCalculator, DurationError, DurationStrategy, TimestampSpan, elapsed_ticks, scan_media,
};
pub use error::RecordingError;
pub use extractor::{ExtractedHeader, Extraction, HeaderExtractor, read_header};
pub use identifier::{InvalidRecordingId, MAX_ID_LENGTH, RecordingId};
pub use media_buffer::{BufferedMedia, MediaBuffer};
pub use offline::{RecordingReport, finalize_file, inspect_file};
pub use registry::{ActiveRecordings, RecordingClaim};
pub use session::{Recorder, RecordingOutcome};
pub use transport::{IngestEnd, TransportFault};
