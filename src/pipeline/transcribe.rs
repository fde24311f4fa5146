//! Transcription invoker: essay image → plain text via a vision model.
//!
//! The request is a single user turn with two blocks, the instruction and
//! the image. No system message: several vision endpoints (Groq's Llama
//! vision models among them) reject system prompts when an image is present.

use crate::config::{InvocationPolicy, ModelProfile};
use crate::pipeline::llm::{invoke, ChatBackend, InvocationOptions, InvocationResult};
use crate::pipeline::message::ModelMessage;
use crate::pipeline::normalize::EncodedImage;
use crate::prompts::TRANSCRIPTION_PROMPT;
use tracing::{info, warn};

/// Build the message list for a transcription request.
pub fn transcription_messages(image: EncodedImage, prompt: Option<&str>) -> Vec<ModelMessage> {
    vec![ModelMessage::user_with_image(
        prompt.unwrap_or(TRANSCRIPTION_PROMPT),
        image,
    )]
}

/// Sampling knobs for a profile.
pub fn transcription_options(profile: &ModelProfile) -> InvocationOptions {
    InvocationOptions {
        temperature: Some(profile.temperature),
        max_tokens: profile.max_tokens,
    }
}

/// Transcribe the essay in `image` with the profile's vision model.
///
/// The text is returned verbatim; deciding whether whitespace-only output
/// counts as a failure is left to the orchestration.
pub async fn transcribe(
    backend: &dyn ChatBackend,
    profile: &ModelProfile,
    image: EncodedImage,
    prompt: Option<&str>,
    policy: &InvocationPolicy,
) -> InvocationResult {
    info!(
        "Transcribing {}x{} image with {} ({})",
        image.width, image.height, profile.label, profile.model
    );
    let messages = transcription_messages(image, prompt);
    let result = invoke(backend, &messages, &transcription_options(profile), policy).await;
    if let Err(ref e) = result {
        warn!("Transcription with {} failed: {}", profile.id, e);
    }
    result
}
