//! Error types for the essay-corrector library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CorrectorError`]: **Fatal** for the request (or for start-up): the
//!   upload is not an image, the profile does not exist, a provider could not
//!   be constructed. The presentation shells turn these into a system-error
//!   display rather than crashing the handler.
//!
//! * [`StageError`]: **Non-fatal**: one model call failed (auth, rate limit,
//!   transport, timeout, empty answer). Invokers return it inside
//!   [`crate::pipeline::llm::InvocationResult`] instead of raising it, so the
//!   orchestration always inspects a tagged result and never has to guess
//!   success from the text of a reply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the essay-corrector library.
#[derive(Debug, Error)]
pub enum CorrectorError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The uploaded bytes are not a decodable PNG/JPEG image.
    #[error("Could not decode image: {detail}")]
    Decode { detail: String },

    /// The upload exceeded the configured size limit.
    #[error("Image is {size} bytes, larger than the {limit}-byte upload limit")]
    ImageTooLarge { size: usize, limit: usize },

    /// The request carried no image at all.
    #[error("No image was uploaded")]
    EmptyUpload,

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The requested model profile is not configured.
    #[error("Unknown model profile '{profile}' (available: {available})")]
    UnknownProfile { profile: String, available: String },

    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Presentation errors ───────────────────────────────────────────────
    /// A page or fragment template failed to render.
    #[error("Template rendering failed: {0}")]
    Render(String),

    /// The HTTP server could not bind or stopped with an I/O error.
    #[error("HTTP server error on {addr}: {source}")]
    Server {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<minijinja::Error> for CorrectorError {
    fn from(e: minijinja::Error) -> Self {
        CorrectorError::Render(e.to_string())
    }
}

/// Broad classification of a provider failure.
///
/// Derived from the typed provider error; see
/// [`crate::provider::classify_llm_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// 401/403, invalid or missing API key.
    Auth,
    /// HTTP 429.
    RateLimited,
    /// Connection reset, DNS failure, 5xx.
    Transport,
    /// The provider answered but the payload could not be interpreted.
    MalformedResponse,
    /// Anything else (bad request, content filter, …).
    Other,
}

impl ProviderErrorKind {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transport)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "authentication",
            Self::RateLimited => "rate limit",
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed response",
            Self::Other => "provider",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single model call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StageError {
    /// The provider rejected or failed the call.
    #[error("{kind} error: {detail}")]
    Provider {
        kind: ProviderErrorKind,
        detail: String,
    },

    /// The model answered with no text at all.
    #[error("the model returned no usable text")]
    EmptyResult,

    /// No answer within the per-call timeout.
    #[error("the model call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl StageError {
    /// Whether the invoker should retry after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Provider { kind, .. } => kind.is_transient(),
            StageError::Timeout { .. } => true,
            StageError::EmptyResult => false,
        }
    }
}
