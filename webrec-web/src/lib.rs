//! webrec web - HTTP ingest and playback server

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Accepts live WebM uploads on `POST /record/{id}` and serves finished
//! recordings under `/recordings`. Request bodies are handed to the core
//! pipeline as a stream of chunks; transport errors are classified here so
//! the core never sees HTTP types.

pub mod handlers;
pub mod server;
pub mod transport;

// Re-export main types
pub use server::{AppState, ServerError, build_router, run_server};
pub use transport::{body_stream, classify_body_error};
