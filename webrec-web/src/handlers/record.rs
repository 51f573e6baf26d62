//! Recording ingest endpoint.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::error;
use webrec_core::container::HeaderError;
use webrec_core::{RecordingError, RecordingOutcome};

use crate::server::AppState;
use crate::transport::body_stream;

/// `POST /record/{id}`: records the request body under `id`.
///
/// The session runs on its own task so that a client disconnect, which
/// drops this handler, does not stop finalization of what was received.
/// Responses carry no body.
pub async fn record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Body,
) -> StatusCode {
    let recorder = Arc::clone(&state.recorder);
    let session = tokio::spawn(async move { recorder.record(&id, body_stream(body)).await });

    match session.await {
        Ok(result) => status_for(&result),
        Err(e) => {
            error!(error = %e, "Recording task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `HEAD` / `OPTIONS` on the ingest route.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Any other method on the ingest route.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Response status for a finished session.
pub fn status_for(result: &Result<RecordingOutcome, RecordingError>) -> StatusCode {
    let err = match result {
        Ok(_) => return StatusCode::OK,
        Err(err) => err,
    };
    match err {
        RecordingError::InProgress { .. } => StatusCode::CONFLICT,
        RecordingError::TimedOut { .. } => StatusCode::REQUEST_TIMEOUT,
        RecordingError::MalformedContainer(HeaderError::TooLarge { .. }) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use webrec_core::recording::{DurationError, RecordingId};
    use webrec_core::{IngestEnd, StorageError};

    use super::*;

    fn outcome() -> RecordingOutcome {
        RecordingOutcome {
            id: "A".to_string(),
            path: PathBuf::from("A.webm"),
            duration_ticks: 1.0,
            duration_ms: 1.0,
            media_bytes: 1,
            ended_by: IngestEnd::Reset,
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Ok(outcome()), StatusCode::OK),
            (
                Err(RecordingError::InProgress {
                    id: RecordingId::parse("A").unwrap(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                Err(RecordingError::TimedOut {
                    limit: Duration::from_secs(1),
                }),
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                Err(HeaderError::TooLarge { limit: 10 }.into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                Err(HeaderError::Truncated { received: 3 }.into()),
                StatusCode::BAD_REQUEST,
            ),
            (Err(RecordingError::EmptyStream), StatusCode::BAD_REQUEST),
            (
                Err(DurationError::NoBlocks.into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Err(StorageError::Io(std::io::Error::other("disk full")).into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Err(RecordingError::TaskFailed {
                    reason: "panicked".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (result, expected) in cases {
            assert_eq!(status_for(&result), expected, "{result:?}");
        }
    }
}
