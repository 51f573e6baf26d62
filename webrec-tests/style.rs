//! Style Enforcement Tests
//!
//! Workspace-wide checks that clippy cannot express.
//!
//! - `dead_code_enforcement` - Prevents #[allow(dead_code)] in production code
//!
//! These tests scan every crate in the workspace and fail on violations.

#[path = "style/dead_code_enforcement.rs"]
mod dead_code_enforcement;
