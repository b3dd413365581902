// Common data models for the relay

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::utils::format_duration;

/// Requested output class of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatClass {
    /// Muxed video+audio at the highest resolution
    #[default]
    Highest,
    /// Muxed video+audio at the lowest resolution
    Lowest,
    /// Audio only, highest bitrate
    Audio,
}

impl FormatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::Lowest => "lowest",
            Self::Audio => "audio",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/mpeg",
            Self::Highest | Self::Lowest => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Highest | Self::Lowest => "mp4",
        }
    }
}

impl fmt::Display for FormatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest" => Ok(Self::Highest),
            "lowest" => Ok(Self::Lowest),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unsupported format '{}'", other)),
        }
    }
}

/// One retrievable variant of a video, as reported by upstream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Upstream format token (e.g. 18, 140)
    pub itag: u32,
    /// Full mime type including codecs, e.g. `video/mp4; codecs="avc1.42001E, mp4a.40.2"`
    pub mime_type: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Free-text resolution label ("720p", "1080p60"), absent for audio
    pub quality_label: Option<String>,
    /// Coarse quality bucket reported upstream ("hd720", "tiny")
    pub quality: Option<String>,
    /// Audio bitrate in bits per second
    pub audio_bitrate: Option<u64>,
    /// Declared byte length
    pub content_length: Option<u64>,
    /// Opaque retrieval handle (direct media URL)
    pub url: String,
}

impl StreamDescriptor {
    /// Container part of the mime type (`mp4`, `webm`, ...)
    pub fn container(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .and_then(|essence| essence.split('/').nth(1))
            .map(str::trim)
            .unwrap_or("")
    }

    pub fn is_muxed(&self) -> bool {
        self.has_video && self.has_audio
    }
}

/// Metadata and streams of one video, held only for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    pub duration_seconds: u64,
    pub formats: Vec<StreamDescriptor>,
}

/// Outcome of a single resolver attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error,
}

/// Record of one resolver attempt; lives only inside one resolution
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based over the whole resolution
    pub attempt: u32,
    pub identity: &'static str,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

/// Response body of `POST /api/video-info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub id: String,
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    pub duration: String,
    pub formats: Vec<VideoFormat>,
}

impl VideoInfo {
    pub fn from_resolved(url: &str, video: &ResolvedVideo) -> Self {
        Self {
            url: url.to_string(),
            id: video.id.clone(),
            title: video.title.clone(),
            author: video.author.clone(),
            thumbnail: video.thumbnail.clone(),
            duration: format_duration(video.duration_seconds),
            formats: video.formats.iter().map(VideoFormat::from).collect(),
        }
    }
}

/// Format summary exposed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub itag: u32,
    pub quality: Option<String>,
    pub mime_type: String,
    pub has_video: bool,
    pub has_audio: bool,
}

impl From<&StreamDescriptor> for VideoFormat {
    fn from(d: &StreamDescriptor) -> Self {
        Self {
            itag: d.itag,
            quality: d.quality_label.clone().or_else(|| d.quality.clone()),
            mime_type: d.mime_type.clone(),
            has_video: d.has_video,
            has_audio: d.has_audio,
        }
    }
}
