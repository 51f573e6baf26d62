//! Verbatim pass-through of media bytes into a scratch sink.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::{IngestEnd, RecordingError, TransportFault};
use crate::storage::{CapturedMedia, MediaSink};

/// Captured media and how the body ended.
#[derive(Debug)]
pub struct BufferedMedia {
    pub media: CapturedMedia,
    pub ended_by: IngestEnd,
    /// When input last arrived: the final chunk, end of body or reset.
    /// A stall does not move it.
    pub last_input: Instant,
}

/// Copies every remaining body byte, unparsed, into a [`MediaSink`].
pub struct MediaBuffer {
    sink: MediaSink,
    idle_timeout: Duration,
}

impl MediaBuffer {
    pub fn new(sink: MediaSink, idle_timeout: Duration) -> Self {
        Self { sink, idle_timeout }
    }

    /// Writes `first` and then the rest of `body` to the sink until the body
    /// ends.
    ///
    /// A peer reset or an idle stall ends the copy successfully; bytes
    /// already written are kept as they are.
    ///
    /// # Errors
    ///
    /// - `RecordingError::Transport` - Body failed with a non-reset fault
    /// - `RecordingError::Storage` - Sink write or sync failed
    pub async fn pump<S>(
        mut self,
        first: Bytes,
        body: &mut S,
    ) -> Result<BufferedMedia, RecordingError>
    where
        S: Stream<Item = Result<Bytes, TransportFault>> + Unpin,
    {
        self.sink.write(&first).await?;
        let mut last_input = Instant::now();

        let ended_by = loop {
            let next = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(
                        idle = ?self.idle_timeout,
                        media_bytes = self.sink.len(),
                        "Peer stalled, finalizing captured media"
                    );
                    break IngestEnd::Stalled;
                }
            };

            match next {
                None => {
                    last_input = Instant::now();
                    break IngestEnd::Completed;
                }
                Some(Ok(chunk)) => {
                    last_input = Instant::now();
                    trace!(len = chunk.len(), "Media chunk");
                    self.sink.write(&chunk).await?;
                }
                Some(Err(TransportFault::Reset { reason })) => {
                    last_input = Instant::now();
                    info!(
                        %reason,
                        media_bytes = self.sink.len(),
                        "Stream reset by peer, finalizing captured media"
                    );
                    break IngestEnd::Reset;
                }
                Some(Err(TransportFault::Fatal { reason })) => {
                    return Err(RecordingError::Transport { reason });
                }
            }
        };

        let media = self.sink.finish().await?;
        debug!(media_bytes = media.len(), ?ended_by, "Media captured");
        Ok(BufferedMedia {
            media,
            ended_by,
            last_input,
        })
    }
}
