//! WebM container model.
//!
//! Only the parts webrec touches are modelled: the EBML header, the segment
//! metadata that precedes media (seek index, info, tracks) and a lightweight
//! view of clusters for timestamp accounting. Media payload is never
//! decoded.

pub mod cluster;
pub mod header;
pub mod parse;
mod serialize;

pub use cluster::{Block, Cluster, ClusterScanner};
pub use header::{
    AudioSettings, ContainerHeader, EbmlHeader, Info, RawElement, SeekEntry, SeekHead, TrackEntry,
    Tracks, VideoSettings,
};
pub use parse::{HeaderError, parse_header};
