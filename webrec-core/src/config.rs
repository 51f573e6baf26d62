//! Centralized configuration for webrec.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::recording::DurationStrategy;

/// Central configuration for all webrec components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct WebrecConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
}

/// Listener and static-file settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port to bind
    pub port: u16,
    /// Directory served at `/` (None = no public site)
    pub public_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_dir: None,
        }
    }
}

/// Where recordings and in-flight media live on disk.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Final recordings, also served at `/recordings`
    pub recordings_dir: PathBuf,
    /// Intermediate media sinks
    pub scratch_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("public/recordings"),
            scratch_dir: std::env::temp_dir().join("webrec"),
        }
    }
}

/// Per-session recording limits and duration accounting.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// How Info.Duration is computed
    pub duration_strategy: DurationStrategy,
    /// Longest gap between body chunks before the peer counts as gone
    pub idle_timeout: Duration,
    /// Upper bound on a whole ingest
    pub max_session_duration: Duration,
    /// Largest header accepted before Tracks must have ended
    pub max_header_bytes: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_strategy: DurationStrategy::Content,
            idle_timeout: Duration::from_secs(30),
            max_session_duration: Duration::from_secs(6 * 60 * 60),
            max_header_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl WebrecConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("WEBREC_RECORDINGS_DIR") {
            config.storage.recordings_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("WEBREC_SCRATCH_DIR") {
            config.storage.scratch_dir = PathBuf::from(dir);
        }

        if let Ok(strategy) = std::env::var("WEBREC_DURATION_STRATEGY") {
            if let Ok(strategy) = strategy.parse::<DurationStrategy>() {
                config.recording.duration_strategy = strategy;
            }
        }

        if let Ok(timeout) = std::env::var("WEBREC_IDLE_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.recording.idle_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(limit) = std::env::var("WEBREC_MAX_SESSION_SECS") {
            if let Ok(seconds) = limit.parse::<u64>() {
                config.recording.max_session_duration = Duration::from_secs(seconds);
            }
        }

        if let Ok(limit) = std::env::var("WEBREC_MAX_HEADER_BYTES") {
            if let Ok(bytes) = limit.parse::<usize>() {
                config.recording.max_header_bytes = bytes;
            }
        }

        config
    }

    /// Creates a configuration rooted in the given directories with short
    /// timeouts, for tests.
    pub fn for_testing(scratch_dir: PathBuf, recordings_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig {
                recordings_dir,
                scratch_dir,
            },
            recording: RecordingConfig {
                idle_timeout: Duration::from_secs(5),
                max_session_duration: Duration::from_secs(60),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl ServerConfig {
    /// Address the listener binds to.
    ///
    /// # Errors
    ///
    /// - `std::net::AddrParseError` - If host is not an IP literal
    pub fn bind_address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
