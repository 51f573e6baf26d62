//! End-to-end tests for webrec
//!
//! These tests bind a real listener and speak HTTP/1.1 over TCP, so body
//! errors come from hyper itself rather than from a synthetic stream.

mod client_disconnect;
