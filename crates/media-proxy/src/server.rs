//! HTTP server for media endpoints
//!
//! Provides /health and /media/{*asset_path}. Media responses are served from
//! the local file cache with range support.

use crate::assets::content_type_for;
use crate::types::{ErrorResponse, HealthResponse};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use file_blob_cache::{BlobSource, CacheError, CancellationToken, FileBlobCache};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};

/// Browsers and shared caches may keep media for about a month
const MEDIA_CACHE_CONTROL: &str = "public, max-age=2629746";

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: FileBlobCache,
    pub source: Arc<dyn BlobSource>,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: FileBlobCache, source: Arc<dyn BlobSource>) -> Self {
        Self {
            cache,
            source,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media/{*asset_path}", get(get_media))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server; returns once a shutdown signal has drained it
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(Arc::clone(&state));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Serve an asset, populating the local cache from the blob store if needed
async fn get_media(
    State(state): State<SharedState>,
    Path(asset_path): Path<String>,
    request: Request,
) -> Response {
    let Some(content_type) = content_type_for(&asset_path) else {
        debug!(asset_path = %asset_path, "Rejected asset extension");
        return error_response(StatusCode::BAD_REQUEST, "Requested a bad path.");
    };

    let cancel = state.shutdown.child_token();
    match state
        .cache
        .ensure_cached(&asset_path, state.source.as_ref(), &cancel)
        .await
    {
        Ok(path) => serve_cached_file(path, content_type, request).await,
        Err(CacheError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "Blob not found"),
        Err(CacheError::InvalidKey(_)) => {
            error_response(StatusCode::BAD_REQUEST, "Requested a bad path.")
        }
        Err(e @ (CacheError::Cancelled | CacheError::Closed)) => {
            debug!(asset_path = %asset_path, error = %e, "Media request abandoned");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
        }
        Err(CacheError::Remote(e)) => {
            warn!(asset_path = %asset_path, error = %e, "Failed to fetch blob");
            error_response(StatusCode::BAD_GATEWAY, "Blob store unavailable")
        }
        Err(e) => {
            error!(asset_path = %asset_path, error = %e, "Failed to cache blob");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Stream a cached file, honouring Range and conditional request headers
async fn serve_cached_file(path: PathBuf, content_type: &'static str, request: Request) -> Response {
    let mime = content_type
        .parse()
        .expect("content types from content_type_for are valid MIME types");
    let response = match ServeFile::new_with_mime(&path, &mime).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let mut response = response.map(Body::new);
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(MEDIA_CACHE_CONTROL),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request as HttpRequest;
    use file_blob_cache::{BlobSink, BlobSourceError, CacheConfig};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct StaticSource {
        blobs: HashMap<String, Vec<u8>>,
        downloads: AtomicUsize,
        broken: bool,
    }

    #[async_trait]
    impl BlobSource for StaticSource {
        async fn exists(&self, key: &str) -> Result<bool, BlobSourceError> {
            if self.broken {
                return Err(BlobSourceError::remote("store offline"));
            }
            Ok(self.blobs.contains_key(key))
        }

        async fn download_into(
            &self,
            key: &str,
            sink: &mut BlobSink<'_>,
            _cancel: &CancellationToken,
        ) -> Result<(), BlobSourceError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let data = self
                .blobs
                .get(key)
                .ok_or_else(|| BlobSourceError::remote("missing"))?;
            sink.write_all(data).await?;
            Ok(())
        }
    }

    fn logo() -> Vec<u8> {
        (0..1024).map(|i| (i % 256) as u8).collect()
    }

    fn create_test_state(cache_dir: PathBuf, source: Arc<StaticSource>) -> SharedState {
        let cache =
            FileBlobCache::new(CacheConfig::new(cache_dir, Duration::from_secs(3600))).unwrap();
        Arc::new(ServerState::new(cache, source))
    }

    fn logo_source() -> Arc<StaticSource> {
        let mut blobs = HashMap::new();
        blobs.insert("images/logo.png".to_string(), logo());
        Arc::new(StaticSource {
            blobs,
            ..Default::default()
        })
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf(), logo_source());
        state.cache.init().await.unwrap();
        let router = create_router(state);

        let response = router
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["hits"], 0);
        assert_eq!(json["cache"]["in_flight"], 0);
    }

    #[tokio::test]
    async fn test_media_served_and_cached() {
        let dir = tempdir().unwrap();
        let source = logo_source();
        let state = create_test_state(dir.path().to_path_buf(), Arc::clone(&source));
        let router = create_router(state);

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(
                    HttpRequest::builder()
                        .uri("/media/images/logo.png")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
            assert_eq!(
                response.headers()[header::CACHE_CONTROL],
                MEDIA_CACHE_CONTROL
            );
            assert_eq!(body_bytes(response).await, logo());
        }

        assert_eq!(source.downloads.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("images").join("logo.png").exists());
    }

    #[tokio::test]
    async fn test_media_range_request() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf(), logo_source());
        let router = create_router(state);

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/media/images/logo.png")
                    .header(header::RANGE, "bytes=100-199")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 100-199/1024"
        );
        assert_eq!(body_bytes(response).await, logo()[100..200].to_vec());
    }

    #[tokio::test]
    async fn test_media_bad_extension() {
        let dir = tempdir().unwrap();
        let source = logo_source();
        let state = create_test_state(dir.path().to_path_buf(), Arc::clone(&source));
        let router = create_router(state);

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/media/scripts/app.js")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error"], "Requested a bad path.");
        assert_eq!(source.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_media_not_found() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf(), logo_source());
        let router = create_router(state);

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/media/images/missing.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_media_store_failure() {
        let dir = tempdir().unwrap();
        let source = Arc::new(StaticSource {
            broken: true,
            ..Default::default()
        });
        let state = create_test_state(dir.path().to_path_buf(), source);
        let router = create_router(state);

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/media/images/logo.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_media_after_shutdown() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf(), logo_source());
        state.cache.close();
        let router = create_router(state);

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/media/images/logo.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path().to_path_buf(), logo_source());

        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
        assert!(!state.shutdown.is_cancelled());
    }
}
