//! HTTP surface of the share service.
//!
//! - `POST /api/create-session`: store captured photos, get a download link
//! - `GET /api/sessions/{id}`: session metadata
//! - `GET /api/qr`: QR code for a link
//! - `GET /s/{id}` and `GET /s/{id}/{index}`: gallery page and raw images

pub mod pages;
pub mod qr;
pub mod sessions;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::session::DOWNLOAD_PATH_PREFIX;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub live_sessions: usize,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        live_sessions: state.sessions.len(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/create-session", post(sessions::create_session))
        .route("/api/sessions/{id}", get(sessions::get_session_info))
        .route("/api/qr", get(qr::qr_code))
        .route(
            &format!("/{DOWNLOAD_PATH_PREFIX}/{{id}}"),
            get(sessions::gallery_page),
        )
        .route(
            &format!("/{DOWNLOAD_PATH_PREFIX}/{{id}}/{{index}}"),
            get(sessions::image_file),
        )
}
