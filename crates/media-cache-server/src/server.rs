//! HTTP server for media cache endpoints
//!
//! Exposes the cache operations to local consumers plus /asset for the
//! on-disk asset store.

use crate::types::{
    ClearQuery, HasResponse, HealthResponse, LoadResponse, PreloadRequest, UrlQuery,
};
use asset_store::AssetStore;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use media_cache::{CacheStats, LoadError, MediaCache, Transport};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Handles shared by every request; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MediaCache>,
    pub assets: Arc<AssetStore>,
    /// Used for `/asset` misses, which bypass the in-memory cache
    pub transport: Arc<dyn Transport>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(cache: Arc<MediaCache>, assets: AssetStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache,
            assets: Arc::new(assets),
            transport,
            started_at: Utc::now(),
        }
    }

    fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Failures of the `/asset` route
#[derive(Debug, PartialEq, Eq)]
enum AssetError {
    OutsidePrefix,
    Unavailable,
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AssetError::OutsidePrefix => {
                (StatusCode::BAD_REQUEST, "URL is outside the asset prefix")
            }
            AssetError::Unavailable => (StatusCode::NOT_FOUND, "Asset not found"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Where an `/asset` response came from, reported in `X-Cache`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetSource {
    Store,
    Upstream,
}

impl AssetSource {
    fn header_value(self) -> &'static str {
        match self {
            AssetSource::Store => "HIT",
            AssetSource::Upstream => "MISS",
        }
    }
}

struct ServedAsset {
    data: Vec<u8>,
    content_type: String,
    source: AssetSource,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/load", get(load))
        .route("/has", get(has))
        .route("/cache", delete(clear))
        .route("/preload", post(preload))
        .route("/asset", get(get_asset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `port` and serve until `shutdown` resolves
pub async fn run_server<F>(state: AppState, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Media cache server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (cache, assets) = tokio::join!(state.cache.get_cache_stats(), state.assets.stats());

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        cache,
        assets,
    })
}

async fn stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.get_cache_stats().await)
}

/// Resolve a URL to a displayable handle
async fn load(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> Response {
    let handle = state.cache.load_file(&query.url).await;
    let status = if handle.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    (
        status,
        Json(LoadResponse {
            url: query.url,
            handle,
        }),
    )
        .into_response()
}

async fn has(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> Json<HasResponse> {
    let present = state.cache.has_file(&query.url).await;
    Json(HasResponse {
        url: query.url,
        present,
    })
}

/// Drop one entry with `?url=`, or everything without it
async fn clear(State(state): State<AppState>, Query(query): Query<ClearQuery>) -> StatusCode {
    match query.url {
        Some(url) => state.cache.clear_file_cache(&url).await,
        None => state.cache.clear_cache().await,
    }
    StatusCode::NO_CONTENT
}

async fn preload(State(state): State<AppState>, Json(request): Json<PreloadRequest>) -> StatusCode {
    state.cache.preload_files(&request.urls[..]).await;
    StatusCode::NO_CONTENT
}

/// Serve an asset from the on-disk store, fetching it on a miss
async fn get_asset(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, AssetError> {
    if !state.assets.accepts(&query.url) {
        return Err(AssetError::OutsidePrefix);
    }

    let served = serve_asset(&state, &query.url).await.map_err(|e| {
        warn!(url = %query.url, error = %e, "Failed to fetch asset");
        AssetError::Unavailable
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, served.content_type),
            (header::CACHE_CONTROL, "public, max-age=604800".to_string()),
            (
                HeaderName::from_static("x-cache"),
                served.source.header_value().to_string(),
            ),
        ],
        served.data,
    )
        .into_response())
}

/// Read the asset from the store, or fetch it upstream and store it
async fn serve_asset(state: &AppState, url: &str) -> Result<ServedAsset, LoadError> {
    if let Some((data, content_type)) = state.assets.get(url).await {
        return Ok(ServedAsset {
            data,
            content_type,
            source: AssetSource::Store,
        });
    }

    let fetched = state.transport.fetch(url).await?;
    if !fetched.is_success() {
        return Err(LoadError::Fetch {
            status: fetched.status,
        });
    }

    let content_type = fetched
        .content_type
        .unwrap_or_else(|| media_cache::content_type_for(url).to_string());

    // A failed write still serves the bytes we already have
    if let Err(e) = state.assets.put(url, &fetched.body, &content_type).await {
        warn!(url = %url, error = %e, "Failed to store asset");
    }

    Ok(ServedAsset {
        data: fetched.body,
        content_type,
        source: AssetSource::Upstream,
    })
}
