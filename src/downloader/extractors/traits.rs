// StreamExtractor trait and common types

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::profiles::{ClientIdentity, HeaderProfile};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{FormatClass, ResolvedVideo, StreamDescriptor};

/// Byte chunks from upstream. `None` ends the stream; an `Err` item is a
/// terminal failure.
pub type ChunkStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// Generic request used when no explicit descriptor matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityHint {
    HighestAudio,
    HighestVideo,
    LowestVideo,
}

impl From<FormatClass> for QualityHint {
    fn from(class: FormatClass) -> Self {
        match class {
            FormatClass::Audio => Self::HighestAudio,
            FormatClass::Highest => Self::HighestVideo,
            FormatClass::Lowest => Self::LowestVideo,
        }
    }
}

impl fmt::Display for QualityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighestAudio => write!(f, "highestaudio"),
            Self::HighestVideo => write!(f, "highestvideo"),
            Self::LowestVideo => write!(f, "lowestvideo"),
        }
    }
}

/// What the relay asks upstream to open
#[derive(Debug, Clone)]
pub enum StreamTarget {
    Descriptor(StreamDescriptor),
    Hint(QualityHint),
}

/// An opened upstream byte stream
pub struct RemoteStream {
    /// Byte length declared by the stream's descriptor, if any
    pub content_length: Option<u64>,
    /// MIME type of the stream actually opened, if known
    pub mime_type: Option<String>,
    pub chunks: ChunkStream,
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("content_length", &self.content_length)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

/// The upstream extraction capability
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a video URL into metadata and stream descriptors using one
    /// client identity. The caller bounds the call with a timeout and may
    /// drop the future at any point.
    async fn resolve(
        &self,
        url: &str,
        identity: &ClientIdentity,
        profile: &HeaderProfile,
    ) -> Result<ResolvedVideo, DownloadError>;

    /// Open the byte stream for a descriptor or a quality hint
    async fn open(
        &self,
        video: &ResolvedVideo,
        target: &StreamTarget,
        profile: &HeaderProfile,
    ) -> Result<RemoteStream, DownloadError>;
}
