//! Session creation and retrieval handlers.

use axum::{
    Json,
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::pages;
use crate::AppState;
use crate::error::{ApiError, ErrorKind, SessionError};

/// Request body for `POST /api/create-session`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    /// Data URLs or bare base64, in capture order.
    pub images: Vec<String>,
    /// Opaque publish intent, stored and echoed.
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub id: String,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
    pub publish: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub publish: bool,
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub index: usize,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    /// Serve as an attachment instead of inline.
    #[serde(default)]
    pub download: bool,
}

/// POST /api/create-session - Store captured photos and return a download link.
pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let Json(req) = payload?;
    let image_count = req.images.len();

    let store = state.sessions.clone();
    let result = tokio::task::spawn_blocking(move || store.create(&req.images, req.publish))
        .await
        .map_err(|e| SessionError::Internal(format!("image validation task failed: {e}")))?;

    let handle = match result {
        Ok(handle) => handle,
        Err(err) => {
            if err.kind() != ErrorKind::Internal {
                warn!(
                    name: "session.rejected",
                    images = image_count,
                    reason = %err,
                    "Session creation rejected"
                );
            }
            return Err(err.into());
        }
    };

    Ok(Json(CreateSessionResponse {
        id: handle.id,
        download_url: handle.download_url.to_string(),
        expires_at: handle.expires_at,
        publish: handle.publish_requested,
    }))
}

/// GET /api/sessions/{id} - Session metadata.
pub async fn get_session_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state.sessions.retrieve(&id)?;
    let base = state.sessions.download_url(session.id())?;

    let images = session
        .images()
        .iter()
        .enumerate()
        .map(|(index, img)| ImageInfo {
            index,
            content_type: img.content_type().to_string(),
            width: img.width(),
            height: img.height(),
            size: img.len(),
            url: format!("{base}/{index}"),
        })
        .collect();

    Ok(Json(SessionInfo {
        id: session.id().to_string(),
        created_at: session.created_at(),
        expires_at: session.expires_at(),
        publish: session.publish_requested(),
        images,
    }))
}

/// GET /s/{id} - Gallery page for a session.
pub async fn gallery_page(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.retrieve(&id) {
        Ok(session) => {
            info!(name: "session.viewed", images = session.images().len(), "Gallery served");
            Html(pages::gallery(&session)).into_response()
        }
        Err(SessionError::NotFound) => {
            (StatusCode::NOT_FOUND, Html(pages::not_found())).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// GET /s/{id}/{index} - Raw image bytes.
pub async fn image_file(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let index: usize = index.parse().map_err(|e| {
        debug!(name: "image.bad_index", error = %e, "Image index is not a number");
        SessionError::NotFound
    })?;
    let image = state.sessions.image(&id, index)?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, image.content_type())
        .header(header::CONTENT_LENGTH, image.len())
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    if query.download {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"photo-{}.{}\"",
                index + 1,
                image.extension()
            ),
        );
    }

    builder
        .body(Body::from(image.into_bytes()))
        .map_err(|e| SessionError::Internal(format!("failed to build image response: {e}")).into())
}
