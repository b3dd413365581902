//! Download history repository.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::downloader::models::FormatClass;

/// Upper bound for one `recent` page.
pub const MAX_PAGE: u32 = 100;

/// History store failure.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("could not format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// One persisted download.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: i64,
    pub video_url: String,
    pub video_title: String,
    pub format: String,
    /// RFC 3339, UTC
    pub created_at: String,
}

/// Fields supplied by the caller; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewDownloadRecord {
    pub video_url: String,
    pub video_title: String,
    pub format: FormatClass,
}

/// Append-only history of downloads.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: NewDownloadRecord) -> Result<DownloadRecord, HistoryError>;

    /// Most recent first, at most `limit` (clamped to `MAX_PAGE`).
    async fn recent(&self, limit: u32) -> Result<Vec<DownloadRecord>, HistoryError>;
}

/// SQLx implementation of HistoryStore.
pub struct SqlxHistoryStore {
    pool: SqlitePool,
}

impl SqlxHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for SqlxHistoryStore {
    async fn append(&self, record: NewDownloadRecord) -> Result<DownloadRecord, HistoryError> {
        let created_at = OffsetDateTime::now_utc().format(&Rfc3339)?;

        let inserted = sqlx::query_as::<_, DownloadRecord>(
            r#"
            INSERT INTO download_history (video_url, video_title, format, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, video_url, video_title, format, created_at
            "#,
        )
        .bind(&record.video_url)
        .bind(&record.video_title)
        .bind(record.format.as_str())
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<DownloadRecord>, HistoryError> {
        let limit = limit.clamp(1, MAX_PAGE) as i64;
        let records = sqlx::query_as::<_, DownloadRecord>(
            "SELECT id, video_url, video_title, format, created_at FROM download_history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
