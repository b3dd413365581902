//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::downloader::ResilientResolver;
use crate::history::HistoryStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Resolver wrapping the extraction capability
    pub resolver: Arc<ResilientResolver>,
    /// Append-only download history
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(resolver: Arc<ResilientResolver>, history: Arc<dyn HistoryStore>) -> Self {
        Self { resolver, history }
    }
}

/// CORS policy: permissive unless an origin is configured. File name and
/// length headers are exposed either way so browsers can read them.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let expose = [header::CONTENT_DISPOSITION, header::CONTENT_LENGTH];

    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .expose_headers(expose),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose),
    }
}

/// Build the application router.
pub fn router(state: AppState, cors_origin: Option<&str>) -> Router {
    Router::new()
        .route("/api/video-info", post(routes::video_info))
        .route("/api/download", get(routes::download))
        .route("/api/history", get(routes::history))
        .route("/api/health", get(routes::health))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until Ctrl-C or SIGTERM.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("API server shutting down...");
}
