//! Decoding and validation of inbound image payloads.

use std::io::Cursor;

use axum::body::Bytes;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageError, ImageFormat, ImageReader, Limits};
use serde::Serialize;

/// Formats accepted from the capture UI.
const SUPPORTED_FORMATS: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Jpeg];

/// Largest width or height accepted, in pixels.
pub const MAX_DIMENSION: u32 = 8192;

/// Decoder allocation budget as a multiple of the encoded size limit.
const ALLOC_FACTOR: u64 = 8;

/// Floor for the decoder allocation budget.
const MIN_ALLOC_BYTES: u64 = 32 * 1024 * 1024;

/// A validated image held by a session.
///
/// Clones share the encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    bytes: Bytes,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl StoredImage {
    /// Raw encoded bytes, exactly as received.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the encoded bytes as a shared buffer.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// MIME type of the encoding, e.g. `image/png`.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// Preferred file extension for downloads.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Why a single payload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRejection {
    /// Zero-based position of the payload in the request.
    pub index: usize,
    pub reason: String,
}

impl std::fmt::Display for ImageRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image {}: {}", self.index, self.reason)
    }
}

/// Decode a data URL or bare base64 payload into a validated image.
///
/// `max_bytes` bounds the decoded size. The image is fully decoded once so
/// truncated or corrupt files are refused here rather than at download time.
/// Decoding runs under [`decode_limits`], so a small file declaring huge
/// dimensions is refused before its pixel buffer is allocated.
pub fn decode_payload(
    index: usize,
    raw: &str,
    max_bytes: usize,
) -> Result<StoredImage, ImageRejection> {
    let reject = |reason: String| ImageRejection { index, reason };

    let encoded = strip_data_url(raw.trim()).map_err(reject)?;
    if encoded.is_empty() {
        return Err(reject("empty payload".to_string()));
    }

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    // base64 expands 3 bytes into 4 characters; refuse before decoding.
    if compact.len() / 4 * 3 > max_bytes + 3 {
        return Err(reject(format!("exceeds maximum size of {max_bytes} bytes")));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| reject(format!("invalid base64: {e}")))?;

    if bytes.is_empty() {
        return Err(reject("empty payload".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(reject(format!(
            "exceeds maximum size of {max_bytes} bytes ({} bytes)",
            bytes.len()
        )));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| reject(format!("unrecognized image encoding: {e}")))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(reject(format!(
            "unsupported image format {}",
            format.to_mime_type()
        )));
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes.as_slice()), format);
    reader.limits(decode_limits(max_bytes));
    let decoded = reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => reject(format!("image exceeds decoding limits: {limit}")),
        other => reject(format!("failed to decode image: {other}")),
    })?;

    Ok(StoredImage {
        width: decoded.width(),
        height: decoded.height(),
        bytes: Bytes::from(bytes),
        format,
    })
}

/// Decoder limits for payloads of at most `max_bytes` encoded bytes.
fn decode_limits(max_bytes: usize) -> Limits {
    let budget = u64::try_from(max_bytes)
        .unwrap_or(u64::MAX)
        .saturating_mul(ALLOC_FACTOR)
        .max(MIN_ALLOC_BYTES);

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DIMENSION);
    limits.max_image_height = Some(MAX_DIMENSION);
    limits.max_alloc = Some(budget);
    limits
}

/// Return the base64 portion of a data URL, or the input unchanged.
fn strip_data_url(raw: &str) -> Result<&str, String> {
    let Some(rest) = raw.strip_prefix("data:") else {
        return Ok(raw);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "malformed data URL".to_string())?;
    let mut parts = meta.split(';');
    let mime = parts.next().unwrap_or_default();
    if !mime.is_empty() && !mime.starts_with("image/") {
        return Err(format!("data URL is not an image ({mime})"));
    }
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err("data URL is not base64 encoded".to_string());
    }
    Ok(payload)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    /// Encode a small solid-color image for tests.
    pub(crate) fn sample_image(format: ImageFormat, shade: u8) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(4, 3, Rgb([shade, 255 - shade, 128u8]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    pub(crate) fn as_data_url(bytes: &[u8], mime: &str) -> String {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_decodes_png_data_url() {
        let png = sample_image(ImageFormat::Png, 10);
        let img = decode_payload(0, &as_data_url(&png, "image/png"), 1 << 20).unwrap();

        assert_eq!(img.bytes(), png.as_slice());
        assert_eq!(img.content_type(), "image/png");
        assert_eq!(img.extension(), "png");
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn test_decodes_bare_base64_jpeg() {
        let jpeg = sample_image(ImageFormat::Jpeg, 200);
        let img = decode_payload(2, &STANDARD.encode(&jpeg), 1 << 20).unwrap();

        assert_eq!(img.content_type(), "image/jpeg");
        assert_eq!(img.extension(), "jpg");
        assert_eq!(img.len(), jpeg.len());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let png = sample_image(ImageFormat::Png, 10);
        let err = decode_payload(1, &as_data_url(&png, "image/png"), 16).unwrap_err();

        assert_eq!(err.index, 1);
        assert!(err.reason.contains("maximum size"));
    }

    #[test]
    fn test_rejects_non_image_payloads() {
        let text = STANDARD.encode(b"definitely not an image");
        assert!(decode_payload(0, &text, 1 << 20).is_err());

        let err = decode_payload(0, "data:text/plain;base64,aGVsbG8=", 1 << 20).unwrap_err();
        assert!(err.reason.contains("not an image"));

        assert!(decode_payload(0, "not base64 at all!!", 1 << 20).is_err());
        assert!(decode_payload(0, "data:image/png;base64,", 1 << 20).is_err());
        assert!(decode_payload(0, "   ", 1 << 20).is_err());
    }

    #[test]
    fn test_accepts_line_wrapped_base64_at_size_limit() {
        // Noise compresses poorly, so the payload spans many lines.
        let mut seed = 0x2545_f491_u32;
        let noise = ImageBuffer::from_fn(64, 64, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut out = Cursor::new(Vec::new());
        noise.write_to(&mut out, ImageFormat::Png).unwrap();
        let png = out.into_inner();
        let encoded = STANDARD.encode(&png);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.len() / 4 * 3 > png.len() + 3);

        let img = decode_payload(0, &wrapped, png.len()).unwrap();
        assert_eq!(img.bytes(), png.as_slice());

        let img = decode_payload(0, &format!("data:image/png;base64,{wrapped}"), png.len()).unwrap();
        assert_eq!(img.len(), png.len());
    }

    #[test]
    fn test_rejects_huge_dimensions() {
        let mut out = Cursor::new(Vec::new());
        image::GrayImage::new(MAX_DIMENSION + 1, 1)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        let wide = out.into_inner();
        assert!(wide.len() < 1 << 20);

        let err = decode_payload(0, &STANDARD.encode(&wide), 1 << 20).unwrap_err();
        assert!(err.reason.contains("decoding limits"), "{}", err.reason);
    }

    #[test]
    fn test_alloc_budget_scales_with_size_limit() {
        assert_eq!(decode_limits(1).max_alloc, Some(MIN_ALLOC_BYTES));
        assert_eq!(
            decode_limits(10 * 1024 * 1024).max_alloc,
            Some(80 * 1024 * 1024)
        );
    }

    #[test]
    fn test_clones_share_bytes() {
        let png = sample_image(ImageFormat::Png, 3);
        let img = decode_payload(0, &STANDARD.encode(&png), 1 << 20).unwrap();
        let copy = img.clone();
        assert_eq!(img.bytes().as_ptr(), copy.into_bytes().as_ptr());
    }

    #[test]
    fn test_rejects_truncated_png() {
        let png = sample_image(ImageFormat::Png, 10);
        let truncated = &png[..png.len() / 2];
        let err = decode_payload(0, &STANDARD.encode(truncated), 1 << 20).unwrap_err();
        assert!(err.reason.contains("decode"));
    }
}
