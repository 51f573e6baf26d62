//! Cluster scanning over buffered media.
//!
//! The scanner walks media bytes (everything after Tracks) and yields one
//! [`Cluster`] at a time with its block timecodes. Block payloads are
//! skipped. Clusters may have known or unknown size; an unknown-size cluster
//! ends at the next segment-level element. A truncated tail ends the scan
//! quietly with only complete blocks reported.

use std::io::Read;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ebml::{EbmlError, EbmlReader, ElementHeader, ids};

/// One media block: SimpleBlock or BlockGroup/Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Block {
    pub track_number: u64,
    /// Offset in ticks relative to the cluster timecode
    pub timecode: i16,
    pub keyframe: bool,
}

/// Cluster with its base timecode and blocks in stream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cluster {
    /// Offset of the Cluster element within the scanned bytes
    pub offset: u64,
    pub timecode: u64,
    pub blocks: Vec<Block>,
}

impl Cluster {
    /// Absolute timestamp of `block` in ticks.
    pub fn absolute_timestamp(&self, block: &Block) -> i64 {
        self.timecode as i64 + i64::from(block.timecode)
    }

    /// Absolute timestamp of the first block.
    pub fn first_timestamp(&self) -> Option<i64> {
        self.blocks
            .first()
            .map(|block| self.absolute_timestamp(block))
    }

    /// Absolute timestamp of the last block.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.blocks
            .last()
            .map(|block| self.absolute_timestamp(block))
    }
}

struct OpenCluster {
    offset: u64,
    end: Option<u64>,
    timecode: Option<u64>,
    blocks: Vec<Block>,
}

impl OpenCluster {
    fn new(header: &ElementHeader) -> Self {
        Self {
            offset: header.offset,
            end: header.end(),
            timecode: None,
            blocks: Vec::new(),
        }
    }

    fn close(self) -> Cluster {
        if self.timecode.is_none() && !self.blocks.is_empty() {
            warn!(offset = self.offset, "Cluster without Timecode, assuming 0");
        }
        Cluster {
            offset: self.offset,
            timecode: self.timecode.unwrap_or(0),
            blocks: self.blocks,
        }
    }
}

/// Iterator over the clusters of a media byte stream.
pub struct ClusterScanner<R> {
    reader: EbmlReader<R>,
    current: Option<OpenCluster>,
    /// Error held back until the cluster that was open has been yielded.
    pending_error: Option<EbmlError>,
    truncated_at: Option<u64>,
    done: bool,
}

impl<R: Read> ClusterScanner<R> {
    /// Scans `source` from its current position, treated as offset 0.
    pub fn new(source: R) -> Self {
        Self {
            reader: EbmlReader::new(source),
            current: None,
            pending_error: None,
            truncated_at: None,
            done: false,
        }
    }

    /// Offset where input ended mid-element, if it did.
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Advances by one element. Returns a cluster when one closes.
    fn step(&mut self) -> Result<Option<Cluster>, EbmlError> {
        let position = self.reader.position();
        let cluster_ended = self
            .current
            .as_ref()
            .and_then(|open| open.end)
            .is_some_and(|end| position >= end);
        if cluster_ended {
            return Ok(self.current.take().map(OpenCluster::close));
        }

        let Some(header) = self.reader.read_element_header()? else {
            self.done = true;
            return Ok(None);
        };

        match header.id {
            ids::CLUSTER => {
                let previous = self.current.replace(OpenCluster::new(&header));
                Ok(previous.map(OpenCluster::close))
            }
            ids::TIMECODE if self.current.is_some() => {
                let timecode = self.reader.read_uint(header.known_size()?)?;
                if let Some(open) = self.current.as_mut() {
                    open.timecode = Some(timecode);
                }
                Ok(None)
            }
            ids::SIMPLE_BLOCK | ids::BLOCK if self.current.is_some() => {
                let block = self.read_block(&header)?;
                if let Some(open) = self.current.as_mut() {
                    open.blocks.push(block);
                }
                Ok(None)
            }
            // Masters whose children we want: read them in place
            ids::BLOCK_GROUP | ids::SEGMENT => Ok(None),
            id => {
                let closed = if ids::is_segment_level(id) {
                    self.current.take().map(OpenCluster::close)
                } else {
                    None
                };
                match header.size {
                    Some(size) => self.reader.skip(size)?,
                    None => debug!(
                        id,
                        offset = header.offset,
                        "Descending into unknown-size element"
                    ),
                }
                Ok(closed)
            }
        }
    }

    fn read_block(&mut self, header: &ElementHeader) -> Result<Block, EbmlError> {
        let size = header.known_size()?;
        let start = self.reader.position();
        let track_number = self.reader.read_vint()?;
        let mut timecode = [0u8; 2];
        self.reader.fill(&mut timecode)?;
        let mut flags = [0u8; 1];
        self.reader.fill(&mut flags)?;

        let consumed = self.reader.position() - start;
        if consumed > size {
            return Err(EbmlError::invalid(header.offset, "block header exceeds block size"));
        }
        self.reader.skip(size - consumed)?;

        Ok(Block {
            track_number,
            timecode: i16::from_be_bytes(timecode),
            keyframe: header.id == ids::SIMPLE_BLOCK && flags[0] & 0x80 != 0,
        })
    }
}

impl<R: Read> Iterator for ClusterScanner<R> {
    type Item = Result<Cluster, EbmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.step() {
                Ok(Some(cluster)) => return Some(Ok(cluster)),
                Ok(None) => {}
                Err(EbmlError::Truncated { offset }) => {
                    debug!(offset, "Media truncated, ending scan");
                    self.truncated_at = Some(offset);
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    if let Some(open) = self.current.take() {
                        self.pending_error = Some(e);
                        return Some(Ok(open.close()));
                    }
                    return Some(Err(e));
                }
            }
        }
        if let Some(open) = self.current.take() {
            return Some(Ok(open.close()));
        }
        self.pending_error.take().map(Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::WebmFixture;

    fn scan(bytes: &[u8]) -> Vec<Cluster> {
        ClusterScanner::new(bytes)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_scans_known_size_clusters() {
        let fixture = WebmFixture::new()
            .cluster(0, &[0, 33, 66])
            .cluster(5000, &[0, 200]);
        let clusters = scan(&fixture.media_bytes());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].timecode, 0);
        assert_eq!(clusters[0].blocks.len(), 3);
        assert_eq!(clusters[1].first_timestamp(), Some(5000));
        assert_eq!(clusters[1].last_timestamp(), Some(5200));
        assert!(clusters[0].blocks[0].keyframe);
    }

    #[test]
    fn test_scans_unknown_size_clusters() {
        let fixture = WebmFixture::new()
            .unknown_size_clusters()
            .cluster(0, &[0, 10])
            .cluster(1000, &[-5, 20]);
        let clusters = scan(&fixture.media_bytes());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].last_timestamp(), Some(10));
        assert_eq!(clusters[1].first_timestamp(), Some(995));
        assert_eq!(clusters[1].last_timestamp(), Some(1020));
    }

    #[test]
    fn test_block_groups_are_counted() {
        let fixture = WebmFixture::new()
            .block_groups()
            .cluster(100, &[0, 40]);
        let clusters = scan(&fixture.media_bytes());

        assert_eq!(clusters[0].blocks.len(), 2);
        assert_eq!(clusters[0].last_timestamp(), Some(140));
        assert!(!clusters[0].blocks[0].keyframe);
    }

    #[test]
    fn test_truncated_tail_keeps_complete_blocks() {
        let fixture = WebmFixture::new()
            .unknown_size_clusters()
            .cluster(0, &[0])
            .cluster(5000, &[0, 200]);
        let media = fixture.media_bytes();
        // Cut inside the last block payload
        let cut = &media[..media.len() - 3];

        let mut scanner = ClusterScanner::new(cut);
        let clusters: Vec<_> = scanner.by_ref().collect::<Result<_, _>>().unwrap();

        assert!(scanner.truncated_at().is_some());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].blocks.len(), 1);
        assert_eq!(clusters[1].last_timestamp(), Some(5000));
    }

    #[test]
    fn test_segment_level_elements_close_unknown_size_cluster() {
        let fixture = WebmFixture::new().unknown_size_clusters().cluster(0, &[7]);
        let mut media = fixture.media_bytes();
        // Cues element with an empty payload
        media.extend_from_slice(&[0x1C, 0x53, 0xBB, 0x6B, 0x80]);

        let clusters = scan(&media);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].last_timestamp(), Some(7));
    }

    #[test]
    fn test_corrupt_tail_yields_open_cluster_before_error() {
        let mut media = WebmFixture::new()
            .unknown_size_clusters()
            .cluster(0, &[0])
            .cluster(5000, &[0, 200])
            .media_bytes();
        media.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let mut scanner = ClusterScanner::new(&media[..]);
        let first = scanner.next().unwrap().unwrap();
        let second = scanner.next().unwrap().unwrap();
        assert_eq!(first.last_timestamp(), Some(0));
        assert_eq!(second.blocks.len(), 2);
        assert_eq!(second.last_timestamp(), Some(5200));
        assert!(matches!(scanner.next(), Some(Err(EbmlError::Invalid { .. }))));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_garbage_media_is_an_error() {
        let result: Result<Vec<_>, _> = ClusterScanner::new(&[0x00, 0x00, 0x00][..]).collect();
        assert!(result.is_err());
    }
}
