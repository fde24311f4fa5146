//! Correction invoker: transcribed essay → structured feedback.

use crate::config::{CorrectionModel, InvocationPolicy};
use crate::pipeline::llm::{invoke, ChatBackend, InvocationOptions, InvocationResult};
use crate::pipeline::message::ModelMessage;
use crate::prompts::{correction_user_prompt, CORRECTION_SYSTEM_PROMPT};
use tracing::{info, warn};

/// Build the system rubric + user essay message pair.
pub fn correction_messages(transcribed_text: &str, rubric: Option<&str>) -> Vec<ModelMessage> {
    vec![
        ModelMessage::system(rubric.unwrap_or(CORRECTION_SYSTEM_PROMPT)),
        ModelMessage::user(correction_user_prompt(transcribed_text)),
    ]
}

/// Ask the text model to correct `transcribed_text`.
pub async fn correct(
    backend: &dyn ChatBackend,
    model: &CorrectionModel,
    transcribed_text: &str,
    rubric: Option<&str>,
    policy: &InvocationPolicy,
) -> InvocationResult {
    info!(
        "Correcting {} chars with {}/{}",
        transcribed_text.len(),
        model.provider,
        model.model
    );
    let messages = correction_messages(transcribed_text, rubric);
    let options = InvocationOptions {
        temperature: model.temperature,
        max_tokens: model.max_tokens,
    };
    let result = invoke(backend, &messages, &options, policy).await;
    if let Err(ref e) = result {
        warn!("Correction failed: {}", e);
    }
    result
}
