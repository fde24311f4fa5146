//! Input resolution for the CLI: a local path or URL → [`UploadedImage`].
//!
//! The web shell receives bytes directly from the multipart form; the CLI
//! receives a path or URL. Both end up as the same `UploadedImage`, so the
//! rest of the pipeline cannot tell the shells apart. Images are held in
//! memory, so both paths enforce the upload limit before buffering: local
//! files by their metadata length, downloads by `Content-Length` and then by
//! a running total while streaming.

use crate::error::CorrectorError;
use crate::pipeline::normalize::UploadedImage;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to image bytes, refusing anything over `max_bytes`.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<UploadedImage, CorrectorError> {
    if input.trim().is_empty() {
        return Err(CorrectorError::InvalidInput {
            input: input.to_string(),
            reason: "not a file path or a valid HTTP/HTTPS URL".into(),
        });
    }
    let upload = if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await?
    } else {
        read_local(input, max_bytes).await?
    };
    ensure_image(&upload)?;
    Ok(upload)
}

/// Read a local file, mapping I/O failures onto our error variants.
async fn read_local(path_str: &str, max_bytes: usize) -> Result<UploadedImage, CorrectorError> {
    let path = PathBuf::from(path_str);
    let io_error = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::NotFound => CorrectorError::FileNotFound { path: path.clone() },
        std::io::ErrorKind::PermissionDenied => {
            CorrectorError::PermissionDenied { path: path.clone() }
        }
        _ => CorrectorError::InvalidInput {
            input: path_str.to_string(),
            reason: e.to_string(),
        },
    };

    let size = tokio::fs::metadata(&path).await.map_err(io_error)?.len();
    if size > max_bytes as u64 {
        return Err(CorrectorError::ImageTooLarge {
            size: usize::try_from(size).unwrap_or(usize::MAX),
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(io_error)?;

    debug!("Read local image: {} ({} bytes)", path.display(), bytes.len());
    let mut upload = UploadedImage::new(bytes);
    if let Some(name) = path.file_name() {
        upload = upload.with_file_name(name.to_string_lossy());
    }
    Ok(upload)
}

/// Download a URL into memory, stopping as soon as it exceeds `max_bytes`.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<UploadedImage, CorrectorError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CorrectorError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let transfer_error = |e: reqwest::Error| {
        if e.is_timeout() {
            CorrectorError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CorrectorError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(transfer_error)?;

    if !response.status().is_success() {
        return Err(CorrectorError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(CorrectorError::ImageTooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                limit: max_bytes,
            });
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transfer_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(CorrectorError::ImageTooLarge {
                size: bytes.len() + chunk.len(),
                limit: max_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());

    let mut upload = UploadedImage::new(bytes);
    if let Some(content_type) = content_type {
        upload = upload.with_content_type(content_type);
    }
    upload.file_name = extract_filename(url);
    Ok(upload)
}

/// Last non-empty URL path segment that looks like a file name.
fn extract_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

/// Reject non-images by their magic bytes before any model is involved.
fn ensure_image(upload: &UploadedImage) -> Result<(), CorrectorError> {
    let format = image::guess_format(&upload.bytes).map_err(|e| CorrectorError::Decode {
        detail: e.to_string(),
    })?;
    debug!("Input detected as {}", format.to_mime_type());
    Ok(())
}
