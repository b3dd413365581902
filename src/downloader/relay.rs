// Stream relay - pipes the selected upstream stream to the client response
//
// The first non-empty chunk is awaited before any header is committed:
// - open failure or error before that chunk -> Err, caller answers 500 JSON
// - error after it -> the body yields an io::Error and hyper drops the
//   connection, leaving the client with a truncated download
//
// Chunks are forwarded one at a time as the client consumes them, so memory
// stays bounded by a single chunk regardless of file size.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::extractors::{ChunkStream, HeaderProfile, StreamExtractor};
use super::format_selector::FormatSelector;
use super::models::{FormatClass, ResolvedVideo};
use super::utils::sanitize_title;

/// Lifecycle of one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Upstream opened, nothing sent yet
    Pending,
    /// At least one byte has been handed to the client
    Streaming { bytes_sent: u64 },
    /// Upstream ended cleanly
    Completed { bytes_sent: u64 },
    /// Upstream failed (or the client left) after bytes were sent
    Aborted { bytes_sent: u64 },
    /// Upstream failed before any byte was sent
    FailedBeforeFirstByte,
}

impl RelayState {
    pub fn bytes_sent(&self) -> u64 {
        match self {
            Self::Streaming { bytes_sent } | Self::Completed { bytes_sent } | Self::Aborted { bytes_sent } => {
                *bytes_sent
            }
            Self::Pending | Self::FailedBeforeFirstByte => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Aborted { .. } | Self::FailedBeforeFirstByte
        )
    }
}

/// Open the stream for `class` and build the streaming response.
///
/// `Err` is only returned while no byte has been sent.
pub async fn relay(
    extractor: &dyn StreamExtractor,
    profile: &HeaderProfile,
    video: &ResolvedVideo,
    class: FormatClass,
) -> Result<Response, DownloadError> {
    let target = FormatSelector::target_for(&video.formats, class);
    debug!("[Relay] {} ({}) -> {:?}", video.id, class, target);

    let remote = match extractor.open(video, &target, profile).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("[Relay] {} {:?}: {}", video.id, RelayState::FailedBeforeFirstByte, e);
            return Err(e);
        }
    };

    let mut chunks = remote.chunks;
    let first = loop {
        match chunks.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => break Some(chunk),
            Some(Err(e)) => {
                warn!("[Relay] {} {:?}: {}", video.id, RelayState::FailedBeforeFirstByte, e);
                return Err(e);
            }
            None => break None,
        }
    };

    let labels = MediaLabels::for_stream(class, remote.mime_type.as_deref());
    let body = RelayBody::new(video.id.clone(), first, chunks);
    Ok(build_response(&video.title, class, &labels, remote.content_length, Body::from_stream(body)))
}

/// Content type and file extension sent to the client
#[derive(Debug, PartialEq, Eq)]
struct MediaLabels {
    content_type: String,
    extension: String,
}

impl MediaLabels {
    /// Labels of the class, unless the opened stream is a video the class
    /// does not describe (a muxed fallback for audio, or a non-mp4 video)
    fn for_stream(class: FormatClass, mime_type: Option<&str>) -> Self {
        let essence = mime_type
            .and_then(|m| m.split(';').next())
            .map(|e| e.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if let Some(container) = essence.strip_prefix("video/") {
            if class.is_audio() || container != class.extension() {
                return Self {
                    extension: container.to_string(),
                    content_type: essence.clone(),
                };
            }
        }

        Self {
            content_type: class.content_type().to_string(),
            extension: class.extension().to_string(),
        }
    }
}

fn build_response(
    title: &str,
    class: FormatClass,
    labels: &MediaLabels,
    content_length: Option<u64>,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let disposition = content_disposition(&format!("{}.{}", sanitize_title(title), labels.extension));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&labels.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(class.content_type())),
    );
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    // without a declared length hyper falls back to chunked framing
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    if !class.is_audio() {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    response
}

/// `attachment` disposition with an ASCII fallback name plus the UTF-8 name
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    if ascii == filename {
        format!("attachment; filename=\"{}\"", ascii)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        )
    }
}

/// Response body replaying the first chunk, then the rest of upstream
struct RelayBody {
    video_id: String,
    first: Option<Bytes>,
    chunks: ChunkStream,
    state: RelayState,
}

impl RelayBody {
    fn new(video_id: String, first: Option<Bytes>, chunks: ChunkStream) -> Self {
        Self {
            video_id,
            first,
            chunks,
            state: RelayState::Pending,
        }
    }

    fn record_sent(&mut self, len: usize) {
        let bytes_sent = self.state.bytes_sent() + len as u64;
        self.state = RelayState::Streaming { bytes_sent };
    }

    fn finish(&mut self, state: RelayState) {
        self.state = state;
        match state {
            RelayState::Completed { bytes_sent } => {
                info!("[Relay] {} completed, {} bytes", self.video_id, bytes_sent);
            }
            _ => warn!("[Relay] {} {:?}", self.video_id, state),
        }
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state.is_terminal() {
            return Poll::Ready(None);
        }

        if let Some(chunk) = self.first.take() {
            self.record_sent(chunk.len());
            return Poll::Ready(Some(Ok(chunk)));
        }

        match self.chunks.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                self.record_sent(chunk.len());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                let bytes_sent = self.state.bytes_sent();
                self.finish(RelayState::Aborted { bytes_sent });
                Poll::Ready(Some(Err(std::io::Error::other(e))))
            }
            Poll::Ready(None) => {
                let bytes_sent = self.state.bytes_sent();
                self.finish(RelayState::Completed { bytes_sent });
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        // client went away mid-download; dropping `chunks` closes upstream
        if !self.state.is_terminal() {
            debug!(
                "[Relay] {} client disconnected after {} bytes",
                self.video_id,
                self.state.bytes_sent()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::{ClientIdentity, RemoteStream, StreamTarget};
    use crate::downloader::models::StreamDescriptor;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    /// Extractor serving a fixed list of chunk results
    struct FixedStream {
        items: Mutex<Option<Vec<Result<Bytes, DownloadError>>>>,
        content_length: Option<u64>,
        mime_type: Option<String>,
        opened: Mutex<Option<StreamTarget>>,
    }

    impl FixedStream {
        fn new(items: Vec<Result<Bytes, DownloadError>>, content_length: Option<u64>) -> Self {
            Self {
                items: Mutex::new(Some(items)),
                content_length,
                mime_type: None,
                opened: Mutex::new(None),
            }
        }

        fn with_mime_type(mut self, mime_type: &str) -> Self {
            self.mime_type = Some(mime_type.to_string());
            self
        }
    }

    #[async_trait]
    impl StreamExtractor for FixedStream {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn resolve(
            &self,
            _url: &str,
            _identity: &ClientIdentity,
            _profile: &HeaderProfile,
        ) -> Result<ResolvedVideo, DownloadError> {
            Err(DownloadError::Transport("not used".to_string()))
        }

        async fn open(
            &self,
            _video: &ResolvedVideo,
            target: &StreamTarget,
            _profile: &HeaderProfile,
        ) -> Result<RemoteStream, DownloadError> {
            *self.opened.lock().unwrap() = Some(target.clone());
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            Ok(RemoteStream {
                content_length: self.content_length,
                mime_type: self.mime_type.clone(),
                chunks: Box::pin(stream::iter(items)),
            })
        }
    }

    fn video() -> ResolvedVideo {
        ResolvedVideo {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Never: Gonna / Give".to_string(),
            author: "Rick".to_string(),
            thumbnail: String::new(),
            duration_seconds: 212,
            formats: vec![StreamDescriptor {
                itag: 18,
                mime_type: "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"".to_string(),
                has_video: true,
                has_audio: true,
                quality_label: Some("360p".to_string()),
                quality: Some("medium".to_string()),
                audio_bitrate: Some(96_000),
                content_length: Some(6),
                url: "https://media.example/18".to_string(),
            }],
        }
    }

    fn chunk(s: &'static str) -> Result<Bytes, DownloadError> {
        Ok(Bytes::from_static(s.as_bytes()))
    }

    #[tokio::test]
    async fn test_streams_all_chunks_with_headers() {
        let extractor = FixedStream::new(vec![chunk("abc"), chunk("def")], Some(6));
        let response = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Highest)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Never Gonna  Give.mp4\""
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abcdef");
        assert!(matches!(
            *extractor.opened.lock().unwrap(),
            Some(StreamTarget::Descriptor(ref d)) if d.itag == 18
        ));
    }

    #[tokio::test]
    async fn test_audio_has_no_cache_headers_and_uses_hint() {
        let extractor = FixedStream::new(vec![chunk("id3")], None);
        let response = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Audio)
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .ends_with(".mp3\""));
        // the only stream is muxed, so audio falls back to the quality hint
        assert!(matches!(
            *extractor.opened.lock().unwrap(),
            Some(StreamTarget::Hint(_))
        ));
    }

    #[tokio::test]
    async fn test_error_before_first_byte_is_returned() {
        let extractor = FixedStream::new(
            vec![
                Ok(Bytes::new()),
                Err(DownloadError::Http {
                    status: 403,
                    context: "fetching media".to_string(),
                }),
            ],
            Some(6),
        );
        let err = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Highest)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Http { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_error_after_first_byte_aborts_body() {
        let extractor = FixedStream::new(
            vec![chunk("abc"), Err(DownloadError::Transport("connection reset".to_string()))],
            Some(6),
        );
        let response = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Highest)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_upstream_completes() {
        let extractor = FixedStream::new(Vec::new(), None);
        let response = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Lowest)
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_body_tracks_state() {
        let chunks: ChunkStream = Box::pin(stream::iter(vec![chunk("de"), chunk("f")]));
        let mut body = RelayBody::new("x".to_string(), Some(Bytes::from_static(b"abc")), chunks);
        while body.next().await.is_some() {}
        assert_eq!(body.state, RelayState::Completed { bytes_sent: 6 });
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_webm_fallback_is_labelled_as_webm() {
        let extractor =
            FixedStream::new(vec![chunk("webm")], None).with_mime_type("video/webm; codecs=\"vp8.0, vorbis\"");
        let response = relay(&extractor, &HeaderProfile::default(), &video(), FormatClass::Highest)
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "video/webm");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Never Gonna  Give.webm\""
        );
    }

    #[test]
    fn test_media_labels() {
        let mp4 = Some("video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"");
        let m4a = Some("audio/mp4; codecs=\"mp4a.40.2\"");

        let labels = MediaLabels::for_stream(FormatClass::Highest, mp4);
        assert_eq!((labels.content_type.as_str(), labels.extension.as_str()), ("video/mp4", "mp4"));
        let labels = MediaLabels::for_stream(FormatClass::Audio, m4a);
        assert_eq!((labels.content_type.as_str(), labels.extension.as_str()), ("audio/mpeg", "mp3"));
        let labels = MediaLabels::for_stream(FormatClass::Lowest, None);
        assert_eq!((labels.content_type.as_str(), labels.extension.as_str()), ("video/mp4", "mp4"));

        // audio request served by a muxed stream
        let labels = MediaLabels::for_stream(FormatClass::Audio, mp4);
        assert_eq!((labels.content_type.as_str(), labels.extension.as_str()), ("video/mp4", "mp4"));
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("Café.mp3");
        assert_eq!(
            value,
            "attachment; filename=\"Caf_.mp3\"; filename*=UTF-8''Caf%C3%A9%2Emp3"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
        assert_eq!(content_disposition("a b.mp4"), "attachment; filename=\"a b.mp4\"");
    }
}
