//! QR code rendering for download links.

use axum::{
    extract::{Query, rejection::QueryRejection},
    http::header,
    response::{IntoResponse, Response},
};
use qrcode::{QrCode, render::svg};
use serde::Deserialize;

use crate::error::ApiError;

const DEFAULT_SIDE: u32 = 256;
const MIN_SIDE: u32 = 64;
const MAX_SIDE: u32 = 1024;

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    /// Text to encode, normally a download URL.
    pub data: String,
    /// `WxH` or a single side length.
    #[serde(default)]
    pub size: Option<String>,
}

/// Parse `WxH` (or `N` for a square), clamping each side into range.
pub fn parse_size(raw: Option<&str>) -> Result<(u32, u32), String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((DEFAULT_SIDE, DEFAULT_SIDE));
    };

    let (w, h) = match raw.split_once(['x', 'X']) {
        Some((w, h)) => (w.trim(), h.trim()),
        None => (raw, raw),
    };
    let parse = |s: &str| {
        s.parse::<u32>()
            .map(|v| v.clamp(MIN_SIDE, MAX_SIDE))
            .map_err(|e| format!("invalid size {raw:?}: {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Render `data` as an SVG QR code of at least `width` x `height` pixels.
pub fn render_svg(data: &str, width: u32, height: u32) -> Result<String, String> {
    if data.is_empty() {
        return Err("data must not be empty".to_string());
    }
    let code = QrCode::new(data.as_bytes()).map_err(|e| format!("cannot encode data: {e}"))?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(width, height)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// GET /api/qr?data=<url>&size=<WxH> - QR code image for a link.
pub async fn qr_code(query: Result<Query<QrQuery>, QueryRejection>) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let (width, height) = parse_size(query.size.as_deref()).map_err(ApiError::bad_request)?;
    let svg = render_svg(&query.data, width, height).map_err(ApiError::bad_request)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    )
        .into_response())
}
