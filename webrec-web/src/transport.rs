//! Maps request body errors onto [`TransportFault`].
//!
//! A browser that closes the tab or reloads mid-recording shows up here as
//! an incomplete message, a cancelled body or a reset socket. Those are
//! resets; the recording keeps what arrived. Anything else is fatal.

use std::error::Error;
use std::io;

use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use webrec_core::TransportFault;

/// Classifies a body error by walking its source chain.
pub fn classify_body_error(err: &(dyn Error + 'static)) -> TransportFault {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>()
            && (hyper_err.is_incomplete_message() || hyper_err.is_canceled())
        {
            return TransportFault::reset(err.to_string());
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && is_reset_kind(io_err.kind())
        {
            return TransportFault::reset(err.to_string());
        }
        current = cause.source();
    }
    TransportFault::fatal(err.to_string())
}

fn is_reset_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Request body as the stream the recording pipeline consumes.
pub fn body_stream(
    body: Body,
) -> impl Stream<Item = Result<Bytes, TransportFault>> + Send + Unpin + 'static {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(|e| classify_body_error(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "body read failed")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_socket_resets_are_resets() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::UnexpectedEof,
        ] {
            let err = io::Error::from(kind);
            assert!(matches!(
                classify_body_error(&err),
                TransportFault::Reset { .. }
            ));
        }
    }

    #[test]
    fn test_reset_found_through_source_chain() {
        let err = Wrapped(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(
            classify_body_error(&err),
            TransportFault::Reset { .. }
        ));

        let axum_err = axum::Error::new(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(
            classify_body_error(&axum_err),
            TransportFault::Reset { .. }
        ));
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let err = io::Error::new(io::ErrorKind::InvalidData, "bad chunk encoding");
        assert_eq!(
            classify_body_error(&err),
            TransportFault::fatal("bad chunk encoding")
        );

        let wrapped = Wrapped(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(
            classify_body_error(&wrapped),
            TransportFault::Fatal { .. }
        ));
    }
}
