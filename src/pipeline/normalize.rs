//! Image normalisation: uploaded bytes → downscaled PNG → base64 payload.
//!
//! VLM APIs accept images as base64 data-URIs embedded in the JSON request
//! body. Whatever the student uploads (a phone JPEG, a scanner PNG) is
//! re-encoded as PNG so every request has the same payload shape, and
//! downscaled to the profile's maximum dimension so we never pay for pixels
//! the model will throw away.
//!
//! PNG is lossless: handwriting strokes stay crisp, which matters more for
//! transcription accuracy than payload size.

use crate::error::CorrectorError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// MIME type of every normalised payload.
pub const PAYLOAD_MIME: &str = "image/png";

/// Raw upload as received by a presentation shell.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Media type declared by the client. Only reported, never trusted.
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            file_name: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// A base64 PNG ready to be attached to a model message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    /// Standard-alphabet base64 of the PNG bytes.
    pub data: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl EncodedImage {
    pub fn was_resized(&self) -> bool {
        (self.width, self.height) != (self.original_width, self.original_height)
    }
}

/// Compute the downscaled size for an image, or `None` if it already fits.
///
/// The longer side becomes exactly `max_dimension`; the shorter side is
/// scaled by the same ratio and rounded to the nearest pixel (never below 1).
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return None;
    }
    let ratio = f64::from(max_dimension) / f64::from(longest);
    let scale = |side: u32| ((f64::from(side) * ratio).round() as u32).clamp(1, max_dimension);

    if width >= height {
        Some((max_dimension, scale(height)))
    } else {
        Some((scale(width), max_dimension))
    }
}

/// Decode, downscale and encode an uploaded image.
///
/// Deterministic: the same bytes and threshold always yield the same payload.
pub fn normalize_image(bytes: &[u8], max_dimension: u32) -> Result<EncodedImage, CorrectorError> {
    let img = image::load_from_memory(bytes).map_err(|e| CorrectorError::Decode {
        detail: e.to_string(),
    })?;
    let (original_width, original_height) = (img.width(), img.height());

    let img = match target_dimensions(original_width, original_height, max_dimension) {
        Some((w, h)) => {
            debug!(
                "Downscaling {}x{} → {}x{} (max {})",
                original_width, original_height, w, h, max_dimension
            );
            img.resize_exact(w, h, FilterType::Lanczos3)
        }
        None => img,
    };

    let data = encode_png_base64(&img)?;
    debug!("Encoded image → {} bytes base64", data.len());

    Ok(EncodedImage {
        data,
        mime_type: PAYLOAD_MIME.to_string(),
        width: img.width(),
        height: img.height(),
        original_width,
        original_height,
    })
}

/// Run [`normalize_image`] on the blocking pool.
///
/// Decoding and Lanczos resampling of a 12-megapixel phone photo is tens of
/// milliseconds of pure CPU; it must not stall the Tokio workers serving
/// other requests.
pub async fn normalize_image_blocking(
    bytes: Vec<u8>,
    max_dimension: u32,
) -> Result<EncodedImage, CorrectorError> {
    tokio::task::spawn_blocking(move || normalize_image(&bytes, max_dimension))
        .await
        .map_err(|e| CorrectorError::Internal(format!("Normalize task panicked: {}", e)))?
}

fn encode_png_base64(img: &DynamicImage) -> Result<String, CorrectorError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CorrectorError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(STANDARD.encode(&buf))
}
