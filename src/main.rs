use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tube_relay::api::{self, AppState};
use tube_relay::downloader::extractors::{HeaderProfile, InnertubeExtractor, StreamExtractor};
use tube_relay::downloader::ResilientResolver;
use tube_relay::history::{self, SqlxHistoryStore};
use tube_relay::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tube_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env()?;

    let pool = history::init_pool(&config.database_url).await?;
    let history = Arc::new(SqlxHistoryStore::new(pool.clone()));

    let profile = HeaderProfile::new(config.cookie.clone());
    if profile.has_cookie() {
        tracing::info!("Forwarding configured cookie upstream");
    }
    let extractor = Arc::new(InnertubeExtractor::new(config.upstream_proxy.as_deref())?);
    let identities: Vec<&str> = config.resolver.identities.iter().map(|i| i.name).collect();
    tracing::info!(
        "Resolver ({}): identities {:?}, {} cycles, {:?} per attempt",
        extractor.name(),
        identities,
        config.resolver.max_cycles,
        config.resolver.timeout
    );
    let resolver = Arc::new(ResilientResolver::new(extractor, profile, config.resolver.clone()));

    let state = AppState::new(resolver, history);
    let app = api::router(state, config.cors_origin.as_deref());

    api::serve(config.socket_addr(), app).await?;

    pool.close().await;
    tracing::info!("tube-relay stopped");
    Ok(())
}
