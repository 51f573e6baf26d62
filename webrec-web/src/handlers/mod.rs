//! HTTP request handlers

pub mod record;

pub use record::{not_found, preflight, record, status_for};
