//! Request handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::server::AppState;
use crate::downloader::extractors::ErrorClass;
use crate::downloader::models::{FormatClass, VideoInfo};
use crate::downloader::relay::relay;
use crate::downloader::utils::is_valid_video_url;
use crate::history::{DownloadRecord, NewDownloadRecord};

const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct VideoInfoRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn require_video_url(url: Option<&str>) -> ApiResult<&str> {
    match url.map(str::trim) {
        Some(url) if is_valid_video_url(url) => Ok(url),
        _ => Err(ApiError::bad_request(ErrorClass::InvalidInput.public_message())),
    }
}

/// `POST /api/video-info`
pub async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> ApiResult<Json<VideoInfo>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let url = require_video_url(Some(&request.url))?;

    let video = state.resolver.resolve(url).await?;
    Ok(Json(VideoInfo::from_resolved(url, &video)))
}

/// `GET /api/download?url=&format=highest|lowest|audio`
pub async fn download(State(state): State<AppState>, Query(query): Query<DownloadQuery>) -> ApiResult<Response> {
    let url = require_video_url(query.url.as_deref())?;
    let format = match query.format.as_deref() {
        None => FormatClass::default(),
        Some(raw) => raw.parse::<FormatClass>().map_err(ApiError::bad_request)?,
    };

    let video = state.resolver.resolve(url).await?;

    // written before streaming, whatever the stream does next; a store
    // failure does not block the download
    let record = NewDownloadRecord {
        video_url: url.to_string(),
        video_title: video.title.clone(),
        format,
    };
    if let Err(e) = state.history.append(record).await {
        tracing::warn!("Could not record download of {}: {}", video.id, e);
    }

    let response = relay(
        state.resolver.extractor().as_ref(),
        state.resolver.profile(),
        &video,
        format,
    )
    .await
    .map_err(|e| {
        tracing::error!("Stream failed before first byte for {}: {}", video.id, e);
        ApiError::internal("Failed to stream the video")
    })?;

    Ok(response)
}

/// `GET /api/history?limit=N`
pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<DownloadRecord>>> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let records = state.history.recent(limit).await?;
    Ok(Json(records))
}

/// `GET /api/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
