//! HTTP surface
//!
//! - `GET  /api/episodes` lists the catalog
//! - `POST /api/clip` cuts a clip and streams it back as an MP4 attachment
//!
//! Every failure leaves through `IntoResponse for ClipError`, the one place
//! where an error becomes a status code and a JSON body.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, EpisodeSummary};
use crate::config::{RemoteEndpoints, ServiceConfig};
use crate::error::ClipError;
use crate::pipeline::{ClipPipeline, ClipRequest};
use crate::transcode::FfmpegTranscoder;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ClipPipeline>,
    catalog: Catalog,
    remote: RemoteEndpoints,
}

impl AppState {
    pub fn new(pipeline: ClipPipeline, catalog: Catalog, remote: RemoteEndpoints) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            catalog,
            remote,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            ClipPipeline::from_config(config),
            config.catalog(),
            config.remote.clone(),
        )
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/episodes", get(list_episodes))
        .route("/api/clip", post(create_clip))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let addr = config.bind_addr()?;

    let mut ffmpeg = FfmpegTranscoder::new();
    if let Some(path) = &config.ffmpeg_path {
        ffmpeg = ffmpeg.with_ffmpeg_path(path.clone());
    }
    if !ffmpeg.check_available().await {
        warn!(
            path = %ffmpeg.ffmpeg_path().display(),
            "ffmpeg not found, clip requests will fail"
        );
    }

    let state = AppState::from_config(&config);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        episodes = state.catalog.len(),
        scratch = %state.pipeline.scratch().root().display(),
        "Listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[derive(Serialize)]
struct EpisodeList {
    episodes: Vec<EpisodeSummary>,
}

async fn list_episodes(State(state): State<AppState>) -> Json<EpisodeList> {
    let episodes = state
        .catalog
        .summaries(|id| state.remote.thumbnail_for(id));
    Json(EpisodeList { episodes })
}

/// Clip request body. Field names follow the web client; aliases accept
/// the older spellings.
#[derive(Debug, Deserialize)]
struct ClipBody {
    #[serde(alias = "source_ref", alias = "sourceRef", alias = "fileId")]
    file_id: Option<String>,
    #[serde(default, alias = "is_container", alias = "isFolder", alias = "isContainer")]
    is_folder: bool,
    #[serde(alias = "startTime")]
    start_time: Option<String>,
    #[serde(alias = "endTime")]
    end_time: Option<String>,
}

async fn create_clip(
    State(state): State<AppState>,
    body: std::result::Result<Json<ClipBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected clip request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request body must be a JSON object" })),
            )
                .into_response();
        }
    };

    match clip(&state, &body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn clip(state: &AppState, body: &ClipBody) -> crate::error::Result<Response> {
    let request = ClipRequest::parse(
        body.file_id.as_deref(),
        body.is_folder,
        body.start_time.as_deref(),
        body.end_time.as_deref(),
    )?;

    let output = state.pipeline.run(&request).await?;
    let disposition = format!("attachment; filename=\"{}\"", output.file_name());
    let size = output.size();
    let stream = output.into_stream().await?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

impl IntoResponse for ClipError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Clip request failed");
        } else {
            warn!(error = %self, "Clip request rejected");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
