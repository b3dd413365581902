//! Download history persistence (SQLite via sqlx).

mod store;

pub use store::{DownloadRecord, HistoryError, HistoryStore, NewDownloadRecord, SqlxHistoryStore, MAX_PAGE};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const DEFAULT_POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the history database and apply pending migrations.
///
/// `database_url` is an sqlx SQLite URL, e.g. `sqlite://history.db?mode=rwc`.
/// The file (and its parent directory) is created when missing.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, HistoryError> {
    init_pool_with_size(database_url, DEFAULT_POOL_SIZE).await
}

/// Same as [`init_pool`] with an explicit connection cap. In-memory databases
/// need a cap of 1, since every connection would otherwise get its own db.
pub async fn init_pool_with_size(database_url: &str, max_connections: u32) -> Result<SqlitePool, HistoryError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HistoryError::Database(sqlx::Error::Io(e)))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("History database ready ({} max connections)", max_connections);
    Ok(pool)
}
