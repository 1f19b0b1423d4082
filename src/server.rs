//! HTTP surface: routing, input validation and the mapping from failures to
//! status codes.
//!
//! Engine work is synchronous and may sleep between retries, so handlers move
//! it onto the blocking pool with `spawn_blocking` and keep the async workers
//! free for other requests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::files::{ScratchDir, stream_attachment};
use crate::media::{DownloadResult, VideoInfo, finalize_download, resolve_format};
use crate::platform::Platform;
use crate::retry::{FetchError, Orchestrator};

const INDEX_FILE: &str = "index.html";
const URL_REQUIRED: &str = "URL is required";
const UNSUPPORTED_ANALYZE: &str =
    "Unsupported platform. Please use YouTube, LinkedIn, X (Twitter), or Instagram.";
const UNSUPPORTED_DOWNLOAD: &str = "Unsupported platform";
const FILE_NOT_FOUND: &str = "File not found";

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    scratch: Arc<ScratchDir>,
    www_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, scratch: ScratchDir, www_root: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            scratch: Arc::new(scratch),
            www_root: Arc::new(www_root.into()),
        }
    }
}

/// Body of both POST endpoints. A missing `url` counts as empty.
#[derive(Debug, Default, Deserialize)]
pub struct VideoRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub format_id: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Blocks become 503 with advice; anything else is a 500 carrying the
    /// engine's own text after `prefix`.
    fn from_fetch(err: FetchError, prefix: &str) -> Self {
        match err {
            FetchError::Blocked { .. } => Self::unavailable(err.user_message()),
            FetchError::Failed(message) => Self::internal(format!("{prefix}: {message}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/download", post(download))
        .route("/api/download-file/{filename}", get(download_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Response {
    let path = state.www_root.join(INDEX_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            error!("could not read {}: {}", path.display(), err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error loading page: {err}"),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Server is running",
    }))
}

/// Trimmed URL and its platform, or the 400 to send back.
fn validate(request: &VideoRequest, unsupported: &str) -> ApiResult<(String, Platform)> {
    let url = request.url.as_deref().unwrap_or_default().trim();
    if url.is_empty() {
        return Err(ApiError::bad_request(URL_REQUIRED));
    }
    let platform = Platform::detect(url);
    if !platform.is_supported() {
        return Err(ApiError::bad_request(unsupported));
    }
    Ok((url.to_string(), platform))
}

fn join_error(err: task::JoinError) -> ApiError {
    ApiError::internal(format!("task join error: {err}"))
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> ApiResult<Json<VideoInfo>> {
    let Json(request) = payload?;
    let (url, platform) = validate(&request, UNSUPPORTED_ANALYZE)?;
    info!(%platform, url = %url, "analyzing video");

    let orchestrator = state.orchestrator.clone();
    let raw = task::spawn_blocking(move || orchestrator.fetch_info(&url, platform))
        .await
        .map_err(join_error)?
        .map_err(|err| ApiError::from_fetch(err, "Failed to analyze video"))?;

    Ok(Json(VideoInfo::from_raw(raw, platform)))
}

async fn download(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> ApiResult<Json<DownloadResult>> {
    let Json(request) = payload?;
    let (url, platform) = validate(&request, UNSUPPORTED_DOWNLOAD)?;
    let format = resolve_format(request.format_id.as_deref());
    info!(%platform, url = %url, format = %format, "downloading video");

    let orchestrator = state.orchestrator.clone();
    let media = task::spawn_blocking(move || orchestrator.download(&url, platform, &format))
        .await
        .map_err(join_error)?
        .map_err(|err| ApiError::from_fetch(err, "Download failed"))?;

    let scratch = state.scratch.clone();
    let result = task::spawn_blocking(move || finalize_download(media, scratch.path()))
        .await
        .map_err(join_error)?
        .map_err(|err| {
            error!("finalizing download: {err:#}");
            ApiError::internal(format!("{err:#}"))
        })?;

    Ok(Json(result))
}

async fn download_file(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    let path = state
        .scratch
        .resolve(&filename)
        .await
        .ok_or_else(|| ApiError::not_found(FILE_NOT_FOUND))?;

    info!(file = %path.display(), "serving download");
    stream_attachment(&path)
        .await
        .map_err(|_| ApiError::not_found(FILE_NOT_FOUND))
}
