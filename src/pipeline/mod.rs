//! Pipeline stages for transcribing and correcting one essay image.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ transcribe ──▶ correct
//! (path/URL) (resize+b64)  (vision LLM)   (text LLM)
//! ```
//!
//! 1. [`input`]    : CLI only: turn a path or URL into an [`normalize::UploadedImage`]
//! 2. [`normalize`]: decode, downscale and PNG/base64-encode; CPU-bound, so it
//!    runs in `spawn_blocking`
//! 3. [`transcribe`] / [`correct`]: build the [`message`]s for each stage and
//!    hand them to [`llm::invoke`], the only place with network I/O

pub mod correct;
pub mod input;
pub mod llm;
pub mod message;
pub mod normalize;
pub mod transcribe;
