// Helper functions shared by the resolver, relay and API handlers

use std::future::Future;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::timeout;
use url::Url;

use super::errors::DownloadError;

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
    static ref UNSAFE_FILENAME_RE: Regex = Regex::new(r"[^\w\s-]").unwrap();
}

const VALID_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

const SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];

const PATH_PREFIXES: &[&str] = &["/embed/", "/v/", "/shorts/", "/live/", "/e/"];

/// Run an upstream operation with a time budget.
///
/// The future is dropped when the budget runs out, which cancels whatever
/// request it had in flight.
pub async fn run_with_timeout<T, F>(budget: Duration, fut: F) -> Result<T, DownloadError>
where
    F: Future<Output = Result<T, DownloadError>>,
{
    match timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(DownloadError::Timeout {
            after_ms: budget.as_millis() as u64,
        }),
    }
}

/// Extract the 11-character video id from a watch/short/embed URL.
///
/// Returns `None` for anything that is not a well-formed link to a single
/// video on a known host.
pub fn parse_video_id(input: &str) -> Option<String> {
    let parsed = Url::parse(input.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();

    let candidate = if SHORT_HOSTS.contains(&host.as_str()) {
        parsed.path_segments()?.next().map(str::to_string)
    } else if VALID_HOSTS.contains(&host.as_str()) {
        let from_query = parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned());
        from_query.or_else(|| {
            let path = parsed.path();
            PATH_PREFIXES.iter().find_map(|prefix| {
                path.strip_prefix(prefix)
                    .and_then(|rest| rest.split('/').next())
                    .map(str::to_string)
            })
        })
    } else {
        None
    }?;

    // ids occasionally arrive with trailing junk (`?si=`, `&t=`), keep the id part
    let id: String = candidate.chars().take(11).collect();
    VIDEO_ID_RE.is_match(&id).then_some(id)
}

pub fn is_valid_video_url(input: &str) -> bool {
    parse_video_id(input).is_some()
}

/// Turn a video title into a safe attachment file name (without extension).
pub fn sanitize_title(title: &str) -> String {
    let cleaned = UNSAFE_FILENAME_RE.replace_all(title, "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format seconds as `H:MM:SS` (with hours) or `M:SS`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
