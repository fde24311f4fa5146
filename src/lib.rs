//! # essay-corrector
//!
//! Transcribe a photographed handwritten essay with a Vision LLM, then have a
//! second LLM point out its spelling, grammar and style problems.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PNG/JPEG bytes)
//!  │
//!  ├─ 1. Normalize   decode, downscale to the profile's threshold, PNG → base64
//!  ├─ 2. Transcribe  vision model, one image + instruction prompt
//!  ├─ 3. Correct     text model, grading rubric as system prompt
//!  └─ 4. Report      tagged CorrectionReport (never an error)
//! ```
//!
//! Two shells sit on top of [`Corrector`]: an HTMX web page served by
//! [`web::serve`] and the `essay-corrector process` CLI subcommand.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use essay_corrector::{Corrector, CorrectorConfig, UploadedImage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs OPENAI_API_KEY (and GROQ_API_KEY for the Groq profile).
//!     let corrector = Corrector::from_config(CorrectorConfig::default())?;
//!     let bytes = std::fs::read("essay.jpg")?;
//!     let report = corrector
//!         .process(UploadedImage::new(bytes).with_file_name("essay.jpg"), None)
//!         .await;
//!     println!("{}\n\n{}", report.transcribed_text, report.corrected_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `essay-corrector` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod corrector;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CorrectionModel, CorrectorConfig, CorrectorConfigBuilder, ModelProfile};
pub use corrector::{CorrectionReport, Corrector, ProcessState};
pub use error::{CorrectorError, ProviderErrorKind, StageError};
pub use pipeline::input::resolve_input;
pub use pipeline::llm::{ChatBackend, InvocationOptions, ModelReply};
pub use pipeline::message::ModelMessage;
pub use pipeline::normalize::{EncodedImage, UploadedImage};
pub use progress::{NoopObserver, PipelineObserver, PipelineObserverRef, Stage};
pub use session::{LastResult, LastResultEntry};
