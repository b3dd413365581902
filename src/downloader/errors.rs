// Error types for upstream extraction and streaming

use thiserror::Error;

use super::extractors::{classify, ErrorClass};
use super::models::RetryAttempt;

/// Failure reported by the extraction capability or the media fetch.
///
/// The `Display` text is what [`classify`] inspects, so variants keep the
/// upstream wording intact.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// The attempt was cancelled after exceeding its time budget
    #[error("Timed out after {after_ms}ms (request aborted)")]
    Timeout { after_ms: u64 },

    /// Upstream answered with a non-success HTTP status
    #[error("HTTP {status} from upstream while {context}")]
    Http { status: u16, context: String },

    /// The player response declared the video unplayable for this client
    #[error("Video unplayable: {0}")]
    Unplayable(String),

    /// The player response did not have the expected shape
    #[error("Could not parse player response: {0}")]
    Parse(String),

    /// Streams exist but none can be fetched without deciphering
    #[error("Could not extract signature deciphering functions: {0}")]
    NoStreams(String),

    /// Neither an explicit descriptor nor the quality hint matched a stream
    #[error("No such format found: {0}")]
    FormatUnavailable(String),

    /// Socket/TLS/body failure talking to upstream
    #[error("Transport error: {0}")]
    Transport(String),

    /// The URL does not identify a video
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl DownloadError {
    pub fn class(&self) -> ErrorClass {
        if matches!(self, Self::InvalidUrl(_)) {
            return ErrorClass::InvalidInput;
        }
        classify(&self.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        // media URLs carry `signature=` query params that would skew classification
        let err = err.without_url();
        if err.is_timeout() {
            return Self::Transport(format!("timed out: {}", err));
        }
        if let Some(status) = err.status() {
            return Self::Http {
                status: status.as_u16(),
                context: err.to_string(),
            };
        }
        Self::Transport(err.to_string())
    }
}

/// Terminal failure of the resilient resolver: the last observed error and
/// every attempt that led to it.
#[derive(Debug, Clone, Error)]
#[error("{last} (after {} attempts)", attempts.len())]
pub struct ResolveError {
    pub last: DownloadError,
    pub attempts: Vec<RetryAttempt>,
}

impl ResolveError {
    pub fn class(&self) -> ErrorClass {
        self.last.class()
    }
}
