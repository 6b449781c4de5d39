use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use cam_station_common::filename::capture_filename;

use crate::poller::{CameraController, FrameSlot};
use crate::{camera, mjpeg, savedir};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub controller: CameraController,
    pub slot: Arc<FrameSlot>,
    pub stream_fps: f64,
    pub save_dir: Mutex<PathBuf>,
}

impl AppState {
    pub fn save_dir(&self) -> PathBuf {
        self.save_dir.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_save_dir(&self, path: PathBuf) {
        *self.save_dir.lock().unwrap_or_else(|e| e.into_inner()) = path;
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectDevice {
    index: u32,
}

#[derive(Debug, Deserialize)]
struct SetSaveDir {
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct CaptureRequest {
    #[serde(default)]
    user_base_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": msg.into() })),
    )
        .into_response()
}

/// GET / — embedded single-page UI
async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

/// GET /stream — MJPEG preview
async fn stream(State(state): State<Arc<AppState>>) -> Response {
    mjpeg::stream_response(Arc::clone(&state.slot), state.stream_fps)
}

/// GET /frame — single current JPEG (poll fallback)
async fn frame(State(state): State<Arc<AppState>>) -> Response {
    match state.slot.latest() {
        Some(frame) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            ],
            frame.data,
        )
            .into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "Camera not available"),
    }
}

/// GET /api/status
async fn status(State(state): State<Arc<AppState>>) -> Response {
    let latest = state.slot.latest();
    Json(serde_json::json!({
        "ok": true,
        "online": latest.is_some(),
        "device_index": state.controller.device_index(),
        "width": latest.as_ref().map(|f| f.width),
        "height": latest.as_ref().map(|f| f.height),
        "seq": state.slot.seq(),
    }))
    .into_response()
}

/// GET /api/devices — enumerate cameras for the picker
async fn devices() -> Response {
    let result = tokio::task::spawn_blocking(camera::list_devices).await;
    match result {
        Ok(Ok(devices)) => Json(devices).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "device enumeration failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /api/device — { "index": 1 } switch the poller to another camera
async fn select_device(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectDevice>,
) -> Response {
    let index = body.index;
    let result = tokio::task::spawn_blocking(move || state.controller.start(index)).await;
    match result {
        Ok(Ok(())) => {
            info!(index, "camera switch requested");
            Json(serde_json::json!({ "ok": true, "index": index })).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, index, "failed to start camera poller");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to start camera poller")
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /api/save_dir
async fn get_save_dir(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({
        "ok": true,
        "path": state.save_dir().display().to_string(),
    }))
    .into_response()
}

/// POST /api/save_dir — { "path": "/somewhere" }
async fn set_save_dir(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSaveDir>,
) -> Response {
    let requested = body.path.trim().to_string();
    if requested.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "path must not be empty");
    }

    let candidate = PathBuf::from(&requested);
    let result =
        tokio::task::spawn_blocking(move || savedir::prepare(&candidate)).await;
    match result {
        Ok(Ok(path)) => {
            info!(path = %path.display(), "save directory changed");
            state.set_save_dir(path.clone());
            Json(serde_json::json!({ "ok": true, "path": path.display().to_string() }))
                .into_response()
        }
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /api/save_dir/browse — native OS folder dialog
async fn browse_save_dir(State(state): State<Arc<AppState>>) -> Response {
    let current = state.save_dir();
    let result = tokio::task::spawn_blocking(move || {
        rfd::FileDialog::new().set_directory(&current).pick_folder()
    })
    .await;

    match result {
        Ok(Some(path)) => {
            info!(path = %path.display(), "save directory picked via dialog");
            state.set_save_dir(path.clone());
            Json(serde_json::json!({ "ok": true, "path": path.display().to_string() }))
                .into_response()
        }
        Ok(None) => Json(serde_json::json!({ "ok": false, "error": "cancelled" })).into_response(),
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /api/capture — { "user_base_name": "..." } (body optional)
///
/// Saves the most recent frame from the slot; never touches the device.
async fn capture(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CaptureRequest>>,
) -> Response {
    let base = body
        .and_then(|Json(b)| b.user_base_name)
        .unwrap_or_default()
        .trim()
        .to_string();

    let Some(frame) = state.slot.latest() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Camera not available");
    };

    let filename = capture_filename(&base);
    let out_path = state.save_dir().join(&filename);

    let write_path = out_path.clone();
    let data = frame.data.clone();
    let result = tokio::task::spawn_blocking(move || std::fs::write(&write_path, &data)).await;

    match result {
        Ok(Ok(())) => {
            info!(
                path = %out_path.display(),
                bytes = frame.data.len(),
                seq = frame.seq,
                "frame captured"
            );
            Json(serde_json::json!({
                "ok": true,
                "saved_path": out_path.display().to_string(),
                "filename": filename,
            }))
            .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, path = %out_path.display(), "failed to write image");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to write image")
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/frame", get(frame))
        .route("/api/status", get(status))
        .route("/api/devices", get(devices))
        .route("/api/device", post(select_device))
        .route("/api/save_dir", get(get_save_dir))
        .route("/api/save_dir", post(set_save_dir))
        .route("/api/save_dir/browse", post(browse_save_dir))
        .route("/api/capture", post(capture))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
