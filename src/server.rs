//! HTTP front end.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /api/search?query=&limit=` | aggregated search |
//! | `GET /api/proxy-image?url=` | streamed image, SVG placeholder on failure |
//! | `GET /api/download/:id?url=&filename=` | attachment download |
//! | `GET /api/image-data/:hashed_id` | decoded token payload |
//! | `GET /view/:hashed_id` | viewer page |
//! | `GET /health` | liveness |

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::TryStreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::fetcher::{extension_for, sanitize_filename, FetchedImage};
use crate::placeholder::{self, render_placeholder};
use crate::{
    sources, AppConfig, FetchPolicy, ResilientFetcher, Result, Search, SearchError,
    SearchResponse, TokenCodec, TokenPayload,
};

const VIEWER_HTML: &str = include_str!("viewer.html");
const PROXY_CACHE_CONTROL: &str = "public, max-age=86400";

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<Search>,
    pub fetcher: Arc<ResilientFetcher>,
    pub codec: Arc<TokenCodec>,
    pub config: Arc<AppConfig>,
    proxy_policy: FetchPolicy,
    download_policy: FetchPolicy,
}

impl AppState {
    /// Builds the state with the seven default sources.
    pub fn new(config: AppConfig) -> Result<Self> {
        let codec = Arc::new(TokenCodec::new(&config.token_secret));
        let fetcher = Arc::new(ResilientFetcher::new()?);
        let client = Client::builder()
            .user_agent(concat!("a3s-image-search/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.source_timeout_secs))
            .build()?;

        let mut search = Search::new(&config, Arc::clone(&codec));
        for source in sources::default_sources(&config, client, fetcher.clone()) {
            search.add_shared_source(source);
        }

        Ok(Self::from_parts(search, fetcher, codec, config))
    }

    /// Builds the state from existing parts.
    pub fn from_parts(
        search: Search,
        fetcher: Arc<ResilientFetcher>,
        codec: Arc<TokenCodec>,
        config: AppConfig,
    ) -> Self {
        Self {
            search: Arc::new(search),
            fetcher,
            codec,
            config: Arc::new(config),
            proxy_policy: FetchPolicy::proxy(),
            download_policy: FetchPolicy::download(),
        }
    }

    /// Overrides the proxy and download fetch policies.
    pub fn with_policies(mut self, proxy: FetchPolicy, download: FetchPolicy) -> Self {
        self.proxy_policy = proxy;
        self.download_policy = download;
        self
    }
}

/// Error response rendered as `{"error": ..., "detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Attaches the underlying error unless running in production.
    fn with_detail(mut self, err: &SearchError, production: bool) -> Self {
        if !production {
            self.detail = Some(err.to_string());
        }
        self
    }

    /// Maps a library error onto a status code.
    pub fn from_search(err: SearchError, production: bool) -> Self {
        let api_error = match &err {
            SearchError::InvalidQuery(msg) => Self::bad_request(msg.clone()),
            SearchError::InvalidUrl(_) | SearchError::UrlParse(_) => {
                Self::bad_request("Invalid URL")
            }
            SearchError::InvalidToken(_) => Self::not_found("Image not found"),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        api_error.with_detail(&err, production)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.detail {
            Some(detail) => json!({ "error": self.message, "detail": detail }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/proxy-image", get(proxy_image_handler))
        .route("/api/download/:id", get(download_handler))
        .route("/api/image-data/:hashed_id", get(image_data_handler))
        .route("/view/:hashed_id", get(viewer_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds `config.bind` and serves until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<()> {
    config.validate()?;
    let addr = config.bind;
    let state = AppState::new(config)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SearchError::Other(format!("Failed to bind {}: {}", addr, e)))?;
    info!(
        "Image search listening on {} with {} sources",
        addr,
        state.search.source_count()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SearchError::Other(format!("Server error: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    limit: Option<usize>,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<SearchResponse>, ApiError> {
    let query = params
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required parameter: query"))?;
    let limit = params.limit.unwrap_or(state.config.default_limit);

    let response = state
        .search
        .search(&query, limit)
        .await
        .map_err(|e| ApiError::from_search(e, state.config.production))?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct ProxyParams {
    url: Option<String>,
}

async fn proxy_image_handler(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> Response {
    let Some(url) = params.url.filter(|u| !u.trim().is_empty()) else {
        return ApiError::bad_request("Missing required parameter: url").into_response();
    };

    match state.fetcher.fetch_image(&url, &state.proxy_policy).await {
        Ok(image) => {
            let mut headers = image_headers(&image);
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(PROXY_CACHE_CONTROL));
            (headers, stream_body(image)).into_response()
        }
        Err(e) => {
            warn!("Proxy failed for {}: {}", url, e);
            placeholder_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    url: Option<String>,
    filename: Option<String>,
}

async fn download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> std::result::Result<Response, ApiError> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required parameter: url"))?;

    let image = state
        .fetcher
        .fetch_image(&url, &state.download_policy)
        .await
        .map_err(|e| {
            warn!("Download failed for {}: {}", url, e);
            ApiError::new(StatusCode::BAD_GATEWAY, "Failed to download image")
                .with_detail(&e, state.config.production)
        })?;

    let stem = sanitize_filename(params.filename.as_deref().unwrap_or(&id));
    let filename = format!("{}.{}", stem, extension_for(&image.content_type));

    let mut headers = image_headers(&image);
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok((headers, stream_body(image)).into_response())
}

async fn image_data_handler(
    State(state): State<AppState>,
    Path(hashed_id): Path<String>,
) -> std::result::Result<Json<TokenPayload>, ApiError> {
    state
        .codec
        .decode(&hashed_id)
        .map(Json)
        .map_err(|e| ApiError::from_search(e, state.config.production))
}

async fn viewer_handler(State(state): State<AppState>, Path(hashed_id): Path<String>) -> Response {
    if state.codec.decode(&hashed_id).is_err() {
        return (StatusCode::NOT_FOUND, Html("<h1>Image not found</h1>")).into_response();
    }
    Html(VIEWER_HTML).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sources": state.search.source_count(),
    }))
}

fn image_headers(image: &FetchedImage) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&image.content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Some(length) = image.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    headers
}

/// Streams the upstream body. Errors after the headers went out can only be
/// logged; the connection is then cut.
fn stream_body(image: FetchedImage) -> Body {
    let url = image.url.clone();
    let stream = image
        .into_stream()
        .inspect_err(move |e| warn!("Stream error while relaying {}: {}", url, e));
    Body::from_stream(stream)
}

fn placeholder_response(err: &SearchError) -> Response {
    let caption = match err {
        SearchError::RetriesExhausted { last_error, .. } => last_error.clone(),
        other => other.to_string(),
    };
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("image/svg+xml")),
            (CACHE_CONTROL, HeaderValue::from_static(placeholder::CACHE_CONTROL)),
        ],
        render_placeholder(&caption),
    )
        .into_response()
}
