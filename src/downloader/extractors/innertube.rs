// Innertube extractor - resolves videos through the site's player API
//
// One call per client identity: POST the identity's client context to the
// player endpoint, check playability, then collect every stream that has a
// direct URL. Signature-ciphered streams are skipped; a response made only
// of ciphered streams is reported as a signature-extraction failure.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;

use super::profiles::{ClientIdentity, HeaderProfile};
use super::traits::{QualityHint, RemoteStream, StreamExtractor, StreamTarget};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{ResolvedVideo, StreamDescriptor};
use crate::downloader::utils::parse_video_id;

const PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";

/// Longest gap between two reads of an upstream response
pub const MEDIA_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Container clients expect by default
const PREFERRED_CONTAINER: &str = "mp4";

/// Extractor speaking the player API over reqwest
pub struct InnertubeExtractor {
    client: reqwest::Client,
    player_url: String,
}

impl InnertubeExtractor {
    /// Build with an optional http/socks5 proxy for all upstream traffic.
    ///
    /// No total timeout is set: media bodies can stream for a long time and
    /// player calls are bounded by the resolver. A read that stalls longer
    /// than [`MEDIA_IDLE_TIMEOUT`] fails the stream.
    pub fn new(proxy: Option<&str>) -> Result<Self, DownloadError> {
        Self::with_idle_timeout(proxy, MEDIA_IDLE_TIMEOUT)
    }

    /// Like [`InnertubeExtractor::new`] with a custom per-read idle timeout
    pub fn with_idle_timeout(proxy: Option<&str>, idle: Duration) -> Result<Self, DownloadError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(idle)
            .tcp_nodelay(true)
            .pool_max_idle_per_host(20);

        // the configured proxy is the only one; system proxy variables are ignored
        builder = match proxy {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| DownloadError::Transport(format!("invalid proxy {}: {}", proxy_url, e)))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder.build()?;
        Ok(Self {
            client,
            player_url: PLAYER_URL.to_string(),
        })
    }

    /// Point player requests somewhere else (local fixtures)
    pub fn with_player_url(mut self, url: impl Into<String>) -> Self {
        self.player_url = url.into();
        self
    }

    /// Parse a player response body into a resolved video
    pub fn parse_player_response(json: &Value) -> Result<ResolvedVideo, DownloadError> {
        let playability = &json["playabilityStatus"];
        let status = playability["status"].as_str().unwrap_or("");
        if status != "OK" {
            let reason = playability["reason"]
                .as_str()
                .or_else(|| playability["messages"][0].as_str())
                .unwrap_or(if status.is_empty() { "missing playability status" } else { status });
            return Err(DownloadError::Unplayable(reason.to_string()));
        }

        let details = &json["videoDetails"];
        let id = details["videoId"]
            .as_str()
            .ok_or_else(|| DownloadError::Parse("missing videoDetails.videoId".to_string()))?
            .to_string();

        let streaming = &json["streamingData"];
        if streaming.is_null() {
            return Err(DownloadError::Parse("missing streamingData".to_string()));
        }

        let raw: Vec<&Value> = ["formats", "adaptiveFormats"]
            .iter()
            .filter_map(|key| streaming[*key].as_array())
            .flatten()
            .collect();

        let formats: Vec<StreamDescriptor> = raw.iter().filter_map(|f| Self::parse_format(f)).collect();

        if formats.is_empty() && !raw.is_empty() {
            return Err(DownloadError::NoStreams(format!(
                "all {} formats of {} require deciphering",
                raw.len(),
                id
            )));
        }

        Ok(ResolvedVideo {
            title: details["title"].as_str().unwrap_or("").to_string(),
            author: details["author"].as_str().unwrap_or("").to_string(),
            thumbnail: Self::best_thumbnail(details),
            duration_seconds: details["lengthSeconds"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| details["lengthSeconds"].as_u64())
                .unwrap_or(0),
            id,
            formats,
        })
    }

    /// One format entry; `None` when it has no direct URL
    fn parse_format(f: &Value) -> Option<StreamDescriptor> {
        let url = f["url"].as_str()?.to_string();
        let itag = f["itag"].as_u64()? as u32;
        let mime_type = f["mimeType"].as_str().unwrap_or("").to_string();

        let essence = mime_type.split(';').next().unwrap_or("");
        let has_video = essence.starts_with("video/");
        // muxed entries list two codecs and carry an audio quality
        let codec_count = mime_type
            .split("codecs=")
            .nth(1)
            .map(|c| c.split(',').count())
            .unwrap_or(0);
        let has_audio = essence.starts_with("audio/")
            || (has_video && (f.get("audioQuality").is_some() || codec_count > 1));

        let audio_bitrate = if has_audio {
            f["averageBitrate"].as_u64().or_else(|| f["bitrate"].as_u64())
        } else {
            None
        };

        Some(StreamDescriptor {
            itag,
            mime_type,
            has_video,
            has_audio,
            quality_label: f["qualityLabel"].as_str().map(str::to_string),
            quality: f["quality"].as_str().map(str::to_string),
            audio_bitrate,
            content_length: f["contentLength"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| f["contentLength"].as_u64()),
            url,
        })
    }

    fn best_thumbnail(details: &Value) -> String {
        details["thumbnail"]["thumbnails"]
            .as_array()
            .and_then(|thumbs| thumbs.iter().max_by_key(|t| t["width"].as_u64().unwrap_or(0)))
            .and_then(|t| t["url"].as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Loose pick for a quality hint: any stream carrying the wanted track.
    ///
    /// Video hints rank streams with sound first, then mp4, then resolution,
    /// so a silent stream is only picked when nothing else has video.
    fn pick_by_hint(formats: &[StreamDescriptor], hint: QualityHint) -> Option<&StreamDescriptor> {
        let height = |d: &StreamDescriptor| {
            crate::downloader::format_selector::parse_quality_label(d.quality_label.as_deref())
        };
        let preferred = |d: &StreamDescriptor| d.container() == PREFERRED_CONTAINER;
        match hint {
            QualityHint::HighestAudio => formats
                .iter()
                .filter(|d| d.has_audio)
                .max_by_key(|d| (!d.has_video, preferred(d), d.audio_bitrate.unwrap_or(0))),
            QualityHint::HighestVideo => formats
                .iter()
                .filter(|d| d.has_video)
                .max_by_key(|d| (d.has_audio, preferred(d), height(d))),
            QualityHint::LowestVideo => formats
                .iter()
                .filter(|d| d.has_video)
                .min_by_key(|d| (!d.has_audio, !preferred(d), height(d))),
        }
    }

    async fn fetch(&self, descriptor: &StreamDescriptor, profile: &HeaderProfile) -> Result<RemoteStream, DownloadError> {
        let response = self
            .client
            .get(&descriptor.url)
            .headers(profile.headers())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                context: format!("fetching media for itag {}", descriptor.itag),
            });
        }

        let content_length = descriptor.content_length.or_else(|| response.content_length());
        let chunks = response.bytes_stream().map_err(DownloadError::from);

        Ok(RemoteStream {
            content_length,
            mime_type: Some(descriptor.mime_type.clone()),
            chunks: Box::pin(chunks),
        })
    }
}

#[async_trait]
impl StreamExtractor for InnertubeExtractor {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn resolve(
        &self,
        url: &str,
        identity: &ClientIdentity,
        profile: &HeaderProfile,
    ) -> Result<ResolvedVideo, DownloadError> {
        let video_id = parse_video_id(url).ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;

        let mut headers = profile.headers();
        headers.insert(USER_AGENT, HeaderValue::from_static(identity.user_agent));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&self.player_url)
            .headers(headers)
            .json(&identity.player_payload(&video_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                context: format!("requesting player as {}", identity.name),
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| DownloadError::Parse(format!("invalid JSON: {}", e.without_url())))?;

        Self::parse_player_response(&json)
    }

    async fn open(
        &self,
        video: &ResolvedVideo,
        target: &StreamTarget,
        profile: &HeaderProfile,
    ) -> Result<RemoteStream, DownloadError> {
        let descriptor = match target {
            StreamTarget::Descriptor(d) => d,
            StreamTarget::Hint(hint) => Self::pick_by_hint(&video.formats, *hint)
                .ok_or_else(|| DownloadError::FormatUnavailable(format!("{} for {}", hint, video.id)))?,
        };

        tracing::debug!(itag = descriptor.itag, video = %video.id, "Opening upstream stream");
        self.fetch(descriptor, profile).await
    }
}
