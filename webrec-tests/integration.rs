//! Integration tests for webrec
//!
//! These tests drive the recording pipeline through its public surfaces:
//! the core `Recorder` with synthetic body streams, and the HTTP router
//! in-process through `tower::ServiceExt::oneshot`.

#[path = "integration/recording_sessions.rs"]
mod recording_sessions;

#[path = "integration/record_endpoint.rs"]
mod record_endpoint;
