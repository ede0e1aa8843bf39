//! Media Proxy - serves media assets from a local file cache
//!
//! Assets live in a remote blob store; each one is downloaded once into the
//! cache directory, kept fresh for a TTL, and streamed to clients from disk
//! with range support.

mod assets;
mod error;
mod server;
mod types;

use crate::error::{MediaProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::MediaProxyConfig;
use file_blob_cache::{CacheConfig, FileBlobCache};
use http_blob_source::HttpBlobSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("media_proxy=info".parse()?)
        .add_directive("file_blob_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Media Proxy...");

    // Load configuration from environment
    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache TTL: {} seconds", config.cache_ttl_secs);

    // Create cache and blob source
    let cache = FileBlobCache::new(CacheConfig::new(
        config.cache_dir,
        Duration::from_secs(config.cache_ttl_secs),
    ))?;
    cache.init().await?;

    let source = HttpBlobSource::new(&config.origin_url)?;

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(cache, Arc::new(source)));

    // Start HTTP server (blocking until shutdown)
    let served = start_server(Arc::clone(&state), config.port).await;

    state.cache.close();
    served.map_err(MediaProxyError::from)
}

fn load_config() -> Result<MediaProxyConfig> {
    let defaults = MediaProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let origin_url = std::env::var("ORIGIN_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| MediaProxyError::Config("ORIGIN_URL is not set".to_string()))?;

    Ok(MediaProxyConfig {
        port,
        cache_dir,
        cache_ttl_secs,
        origin_url,
    })
}
