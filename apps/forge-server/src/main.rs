use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use forge_server::{build_router, AppState, ServerConfig};
use forge_store::{MemoryStore, Store};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let config = ServerConfig::from_env();
    let store = open_store().await?;
    let server_name =
        std::env::var("FORGE_SERVER_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").into());
    let state = AppState::new(store, config, server_name);
    info!(
        server_name = state.server_name(),
        session_id = state.session_id(),
        "forge coordinator starting"
    );

    let bind = std::env::var("FORGE_BIND").unwrap_or_else(|_| "127.0.0.1:8087".into());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid FORGE_BIND {bind:?}"))?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

/// Pick the backing store: redis when `FORGE_REDIS_URL` is set, the
/// in-process store otherwise.
async fn open_store() -> anyhow::Result<Arc<dyn Store>> {
    match std::env::var("FORGE_REDIS_URL") {
        Ok(url) if !url.is_empty() => open_redis(&url).await,
        _ => {
            info!("using in-process memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(feature = "redis")]
async fn open_redis(url: &str) -> anyhow::Result<Arc<dyn Store>> {
    let store = forge_store::RedisStore::connect(url)
        .await
        .with_context(|| format!("connecting to redis at {url}"))?;
    info!(%url, "using redis store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(url: &str) -> anyhow::Result<Arc<dyn Store>> {
    anyhow::bail!("FORGE_REDIS_URL set to {url} but built without the redis feature")
}
