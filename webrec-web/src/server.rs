//! Router construction and the server run loop.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::post;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;
use webrec_core::{Recorder, StorageError, WebrecConfig};

use crate::handlers::{not_found, preflight, record};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Runs recording sessions
    pub recorder: Arc<Recorder>,
}

impl AppState {
    /// Wraps a recorder for sharing across handlers.
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder: Arc::new(recorder),
        }
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Host/port pair is not a socket address
    #[error("Invalid listen address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// Storage directories are unusable
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    /// Bind or accept loop failed
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the application router.
///
/// - `POST /record/{id}` ingests a recording; `HEAD` and `OPTIONS` answer
///   200, other methods 404
/// - `GET /recordings/...` serves finished recordings
/// - everything else is served from `public_dir` when given, 404 otherwise
pub fn build_router(state: AppState, public_dir: Option<&Path>) -> Router {
    let recordings = ServeDir::new(state.recorder.storage().recordings_dir());
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let router = Router::new()
        .route(
            "/record/{id}",
            post(record)
                .head(preflight)
                .options(preflight)
                .fallback(not_found),
        )
        .nest_service("/recordings", recordings)
        .with_state(state);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    router.layer(
        ServiceBuilder::new()
            .layer(cors)
            .layer(DefaultBodyLimit::disable()),
    )
}

/// Creates the storage directories, binds and serves until Ctrl-C.
///
/// # Errors
///
/// - `ServerError::InvalidAddress` - Host is not an IP address
/// - `ServerError::Storage` - Directories cannot be created
/// - `ServerError::Io` - Bind fails
pub async fn run_server(config: WebrecConfig) -> Result<(), ServerError> {
    let address = config.server.bind_address()?;

    let recorder = Recorder::from_config(&config);
    let swept = recorder.storage().prepare().await?;
    if swept > 0 {
        info!(swept, "Removed leftover scratch files from a previous run");
    }

    let app = build_router(AppState::new(recorder), config.server.public_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(
        %address,
        recordings_dir = %config.storage.recordings_dir.display(),
        strategy = %config.recording.duration_strategy,
        "webrec listening on http://{address}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; serve until killed
        std::future::pending::<()>().await;
    }
}
