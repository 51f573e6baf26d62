//! Incremental container header extraction.
//!
//! Chunks are accumulated until the header parses through Tracks. Bytes
//! after Tracks are handed back untouched as the start of the media.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use super::{RecordingError, TransportFault};
use crate::container::{ContainerHeader, HeaderError, parse_header};
use crate::ebml::{EbmlError, EbmlReader, ids};

/// Parsed header plus the first media bytes that arrived with it.
#[derive(Debug)]
pub struct ExtractedHeader {
    pub header: ContainerHeader,
    /// Length of the header in the input stream
    pub header_len: usize,
    /// Bytes following Tracks in the chunk that completed the header
    pub remainder: Bytes,
}

/// Outcome of feeding one chunk.
#[derive(Debug)]
pub enum Extraction {
    NeedMore,
    Complete(ExtractedHeader),
}

/// Accumulates header bytes until Tracks have been read.
#[derive(Debug)]
pub struct HeaderExtractor {
    buffer: BytesMut,
    max_header_bytes: usize,
    /// Buffer length below which a parse cannot complete
    ready_at: usize,
}

impl HeaderExtractor {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_header_bytes,
            ready_at: 0,
        }
    }

    /// Bytes buffered so far.
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds `chunk` and re-attempts the parse once the element in progress
    /// is fully buffered.
    ///
    /// # Errors
    ///
    /// - `HeaderError::Malformed` / `HeaderError::UnsupportedDocType` -
    ///   Bytes before the end of Tracks are not a usable header
    /// - `HeaderError::TooLarge` - Tracks did not end within the limit
    pub fn push(&mut self, chunk: &[u8]) -> Result<Extraction, HeaderError> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() < self.ready_at {
            return self.need_more();
        }
        self.ready_at = parse_ready_at(&self.buffer);
        if self.buffer.len() < self.ready_at {
            return self.need_more();
        }

        let mut reader = EbmlReader::new(&self.buffer[..]);
        match parse_header(&mut reader) {
            Ok(header) => {
                let header_len = reader.position() as usize;
                if header_len > self.max_header_bytes {
                    return Err(HeaderError::TooLarge {
                        limit: self.max_header_bytes,
                    });
                }
                let mut buffer = std::mem::take(&mut self.buffer);
                let remainder = buffer.split_off(header_len).freeze();
                Ok(Extraction::Complete(ExtractedHeader {
                    header,
                    header_len,
                    remainder,
                }))
            }
            Err(HeaderError::Incomplete) => self.need_more(),
            Err(e) => Err(e),
        }
    }

    fn need_more(&self) -> Result<Extraction, HeaderError> {
        // The header ends at or after `ready_at`
        if self.buffer.len() > self.max_header_bytes || self.ready_at > self.max_header_bytes {
            return Err(HeaderError::TooLarge {
                limit: self.max_header_bytes,
            });
        }
        trace!(
            buffered = self.buffer.len(),
            ready_at = self.ready_at,
            "Header incomplete"
        );
        Ok(Extraction::NeedMore)
    }

    /// Error for input that ended before the header completed.
    pub fn end_of_input(&self) -> RecordingError {
        match self.buffer.len() {
            0 => RecordingError::EmptyStream,
            received => HeaderError::Truncated { received }.into(),
        }
    }
}

/// Smallest buffer length at which a full header parse can succeed.
///
/// Walks the top-level element headers without decoding payloads: each
/// known-size element before Tracks has to be complete first. Returns 0
/// when the buffer should be parsed now, including anything unexpected
/// that the parse will report.
fn parse_ready_at(buffer: &[u8]) -> usize {
    let mut pos = 0usize;
    loop {
        let mut reader = EbmlReader::new(&buffer[pos..]);
        let header = match reader.read_element_header() {
            Ok(Some(header)) => header,
            Ok(None) | Err(EbmlError::Truncated { .. }) => return buffer.len() + 1,
            Err(_) => return 0,
        };
        if pos == 0 && header.id != ids::EBML {
            return 0;
        }

        let data = pos as u64 + header.data_offset();
        if header.id == ids::SEGMENT {
            pos = data as usize;
            continue;
        }
        let Some(size) = header.size else {
            return 0;
        };
        let end = data.saturating_add(size);
        if end > buffer.len() as u64 {
            return usize::try_from(end).unwrap_or(usize::MAX);
        }
        if header.id == ids::TRACKS || header.id == ids::CLUSTER {
            return 0;
        }
        pos = end as usize;
    }
}

/// Reads chunks from `body` until the header is complete.
///
/// # Errors
///
/// - `RecordingError::EmptyStream` - Body ended with no bytes
/// - `RecordingError::MalformedContainer` - Header invalid, too large, or
///   cut short by a normal end of body
/// - `RecordingError::AbortedBeforeMedia` - Peer reset or stalled first
/// - `RecordingError::Transport` - Body failed for another reason
pub async fn read_header<S>(
    body: &mut S,
    max_header_bytes: usize,
    idle_timeout: Duration,
) -> Result<ExtractedHeader, RecordingError>
where
    S: Stream<Item = Result<Bytes, TransportFault>> + Unpin,
{
    let mut extractor = HeaderExtractor::new(max_header_bytes);

    loop {
        let next = match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(next) => next,
            Err(_) => {
                return Err(RecordingError::AbortedBeforeMedia {
                    reason: format!("no data for {idle_timeout:?}"),
                    received: extractor.received(),
                });
            }
        };

        match next {
            None => return Err(extractor.end_of_input()),
            Some(Err(TransportFault::Reset { reason })) => {
                return Err(RecordingError::AbortedBeforeMedia {
                    reason,
                    received: extractor.received(),
                });
            }
            Some(Err(TransportFault::Fatal { reason })) => {
                return Err(RecordingError::Transport { reason });
            }
            Some(Ok(chunk)) => {
                if let Extraction::Complete(extracted) = extractor.push(&chunk)? {
                    debug!(
                        header_bytes = extracted.header_len,
                        tracks = extracted.header.tracks.entries.len(),
                        doc_type = %extracted.header.ebml.doc_type,
                        "Container header extracted"
                    );
                    return Ok(extracted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio::test;

    use super::*;
    use crate::test_fixtures::{WebmFixture, chunked};

    const LIMIT: usize = 1024 * 1024;
    const IDLE: Duration = Duration::from_secs(5);

    #[test]
    async fn test_header_split_across_chunks() {
        let fixture = WebmFixture::new().cluster(0, &[0, 20]);
        let bytes = fixture.to_bytes();
        let header_len = fixture.header_bytes().len();
        let mut body = stream::iter(chunked(&bytes, 7));

        let extracted = read_header(&mut body, LIMIT, IDLE).await.unwrap();

        assert_eq!(extracted.header_len, header_len);
        assert_eq!(extracted.header.tracks.entries.len(), 2);
        // Remainder plus the rest of the body is exactly the media
        let mut media = extracted.remainder.to_vec();
        while let Some(chunk) = body.next().await {
            media.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(media, fixture.media_bytes());
    }

    #[test]
    async fn test_single_chunk_returns_all_media_as_remainder() {
        let fixture = WebmFixture::new().cluster(0, &[0]).cluster(100, &[5]);
        let mut extractor = HeaderExtractor::new(LIMIT);

        let Extraction::Complete(extracted) = extractor.push(&fixture.to_bytes()).unwrap() else {
            panic!("header should be complete");
        };
        assert_eq!(extracted.remainder.as_ref(), &fixture.media_bytes()[..]);
    }

    #[test]
    async fn test_empty_body() {
        let mut body = stream::iter(Vec::<Result<Bytes, TransportFault>>::new());
        let result = read_header(&mut body, LIMIT, IDLE).await;
        assert!(matches!(result, Err(RecordingError::EmptyStream)));
    }

    #[test]
    async fn test_body_ending_mid_header_is_malformed() {
        let header = WebmFixture::new().header_bytes();
        let mut body = stream::iter(chunked(&header[..header.len() - 1], 16));

        let result = read_header(&mut body, LIMIT, IDLE).await;
        assert!(matches!(
            result,
            Err(RecordingError::MalformedContainer(HeaderError::Truncated { .. }))
        ));
    }

    #[test]
    async fn test_reset_mid_header_aborts() {
        let header = WebmFixture::new().header_bytes();
        let mut chunks = chunked(&header[..40], 10);
        chunks.push(Err(TransportFault::reset("connection reset")));
        let mut body = stream::iter(chunks);

        let result = read_header(&mut body, LIMIT, IDLE).await;
        assert!(matches!(
            result,
            Err(RecordingError::AbortedBeforeMedia { received: 40, .. })
        ));
    }

    #[test]
    async fn test_fatal_transport_error() {
        let mut body = stream::iter(vec![Err(TransportFault::fatal("tls alert"))]);
        let result = read_header(&mut body, LIMIT, IDLE).await;
        assert!(matches!(result, Err(RecordingError::Transport { .. })));
    }

    #[test]
    async fn test_garbage_fails_fast() {
        let mut extractor = HeaderExtractor::new(LIMIT);
        assert!(matches!(
            extractor.push(b"GET / HTTP/1.1\r\n"),
            Err(HeaderError::Malformed { .. })
        ));
    }

    #[test]
    async fn test_header_over_limit() {
        let header = WebmFixture::new().header_bytes();
        let mut extractor = HeaderExtractor::new(32);

        let result = extractor.push(&header[..64]);
        assert!(matches!(result, Err(HeaderError::TooLarge { limit: 32 })));

        let mut whole = HeaderExtractor::new(header.len() - 1);
        assert!(matches!(
            whole.push(&header),
            Err(HeaderError::TooLarge { .. })
        ));
    }

    #[test]
    async fn test_byte_by_byte_header_parses_once_tracks_arrive() {
        let fixture = WebmFixture::new().cluster(0, &[0]);
        let header = fixture.header_bytes();

        // No prefix short of the full header is ready for a parse
        for len in 0..header.len() {
            assert!(parse_ready_at(&header[..len]) > len, "parse attempted at {len}");
        }
        assert_eq!(parse_ready_at(&header[..header.len() - 1]), header.len());
        assert_eq!(parse_ready_at(&header), 0);

        let mut body = stream::iter(chunked(&fixture.to_bytes(), 1));
        let extracted = read_header(&mut body, LIMIT, IDLE).await.unwrap();
        assert_eq!(extracted.header_len, header.len());
        assert_eq!(extracted.header.tracks.entries.len(), 2);
    }

    #[test]
    async fn test_element_past_limit_fails_before_it_arrives() {
        let header = WebmFixture::new().header_bytes();
        let mut extractor = HeaderExtractor::new(header.len() - 1);

        // Tracks is announced but its end lies beyond the limit
        let result = extractor.push(&header[..header.len() - 2]);
        assert!(matches!(result, Err(HeaderError::TooLarge { .. })));
    }

    #[test(start_paused = true)]
    async fn test_stall_before_header_aborts() {
        let header = WebmFixture::new().header_bytes();
        let first = stream::iter(chunked(&header[..20], 20));
        let mut body = first.chain(stream::pending());

        let result = read_header(&mut body, LIMIT, IDLE).await;
        assert!(matches!(
            result,
            Err(RecordingError::AbortedBeforeMedia { received: 20, .. })
        ));
    }
}
