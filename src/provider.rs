//! edgequake-llm adapter: real providers behind the [`ChatBackend`] seam.
//!
//! Providers are constructed ONCE at start-up from [`CorrectorConfig`] and
//! injected into [`crate::Corrector`]. Nothing here is global: tests build a
//! `Corrector` from fakes and never touch this module.

use crate::config::CorrectorConfig;
use crate::error::{CorrectorError, ProviderErrorKind, StageError};
use crate::pipeline::llm::{ChatBackend, InvocationOptions, ModelReply};
use crate::pipeline::message::{ModelMessage, Role};
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A [`ChatBackend`] backed by an `edgequake_llm` provider.
pub struct EdgequakeBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl EdgequakeBackend {
    /// Wrap an already-constructed provider.
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    /// Instantiate a named provider with the given model.
    ///
    /// The factory reads the matching API key (`OPENAI_API_KEY`,
    /// `GROQ_API_KEY`, …) from the environment.
    pub fn connect(provider_name: &str, model: &str) -> Result<Self, CorrectorError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            CorrectorError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(format!("{provider_name}/{model}"), provider))
    }
}

#[async_trait]
impl ChatBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ModelMessage],
        options: &InvocationOptions,
    ) -> Result<ModelReply, StageError> {
        let chat_messages = to_chat_messages(messages);
        let options = CompletionOptions {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&chat_messages, Some(&options))
            .await
            .map_err(|e| classify_llm_error(&e))?;

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Convert provider-neutral messages into edgequake-llm messages.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// squashing it into one 512 px overview, which is what makes small
/// handwriting legible.
fn to_chat_messages(messages: &[ModelMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| {
            let text = m.text();
            match m.role() {
                Role::System => ChatMessage::system(text.as_str()),
                Role::User => {
                    let images: Vec<ImageData> = m
                        .images()
                        .map(|img| {
                            ImageData::new(img.data.clone(), img.mime_type.as_str())
                                .with_detail("high")
                        })
                        .collect();
                    if images.is_empty() {
                        ChatMessage::user(text.as_str())
                    } else {
                        ChatMessage::user_with_images(text.as_str(), images)
                    }
                }
            }
        })
        .collect()
}

/// Map an edgequake-llm error onto a [`StageError`].
///
/// Server-reported failures (`ApiError`, `ProviderError`) count as transport
/// errors and are retried; request-shaped failures such as an oversized
/// prompt or an unknown model are not. `detail` is for display only.
pub fn classify_llm_error(error: &LlmError) -> StageError {
    let kind = match error {
        LlmError::AuthError(_) => ProviderErrorKind::Auth,
        LlmError::RateLimited(_) => ProviderErrorKind::RateLimited,
        LlmError::NetworkError(_)
        | LlmError::Timeout
        | LlmError::ApiError(_)
        | LlmError::ProviderError(_) => ProviderErrorKind::Transport,
        LlmError::SerializationError(_) => ProviderErrorKind::MalformedResponse,
        LlmError::InvalidRequest(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ModelNotFound(_)
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_)
        | LlmError::Unknown(_) => ProviderErrorKind::Other,
    };

    StageError::Provider {
        kind,
        detail: error.to_string(),
    }
}

/// Connected backends for every configured stage.
pub struct Backends {
    /// Keyed by profile id. Profiles whose provider could not be built are
    /// absent.
    pub transcription: HashMap<String, Arc<dyn ChatBackend>>,
    pub correction: Arc<dyn ChatBackend>,
}

/// Build backends for all profiles and the correction model.
///
/// A profile whose provider cannot be constructed (typically a missing API
/// key) is skipped with a warning so the other profiles stay usable. Start-up
/// fails only if no transcription profile or no correction model is usable.
pub fn connect_backends(config: &CorrectorConfig) -> Result<Backends, CorrectorError> {
    let mut transcription: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
    let mut first_error = None;

    for profile in &config.profiles {
        match EdgequakeBackend::connect(&profile.provider, &profile.model) {
            Ok(backend) => {
                info!("Profile '{}' ready: {}", profile.id, backend.name());
                transcription.insert(profile.id.clone(), Arc::new(backend));
            }
            Err(e) => {
                warn!("Profile '{}' unavailable: {}", profile.id, e);
                first_error.get_or_insert(e);
            }
        }
    }

    if transcription.is_empty() {
        return Err(first_error.unwrap_or_else(|| CorrectorError::ProviderNotConfigured {
            provider: "auto".into(),
            hint: "No transcription profile is configured.".into(),
        }));
    }

    let correction = EdgequakeBackend::connect(&config.correction.provider, &config.correction.model)?;
    info!("Correction model ready: {}", correction.name());

    Ok(Backends {
        transcription,
        correction: Arc::new(correction),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::correct::correction_messages;
    use crate::pipeline::normalize::EncodedImage;
    use crate::pipeline::transcribe::transcription_messages;
    use crate::prompts::{CORRECTION_SYSTEM_PROMPT, TRANSCRIPTION_PROMPT};
    use edgequake_llm::ChatRole;

    fn kind_of(e: &StageError) -> ProviderErrorKind {
        match e {
            StageError::Provider { kind, .. } => *kind,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn auth_error_is_permanent() {
        let e = classify_llm_error(&LlmError::AuthError("Incorrect API key provided".into()));
        assert_eq!(kind_of(&e), ProviderErrorKind::Auth);
        assert!(!e.is_transient());
    }

    #[test]
    fn rate_limit_is_transient() {
        let e = classify_llm_error(&LlmError::RateLimited("429 Too Many Requests".into()));
        assert_eq!(kind_of(&e), ProviderErrorKind::RateLimited);
        assert!(e.is_transient());
    }

    #[test]
    fn network_and_timeout_are_transport() {
        for error in [
            LlmError::NetworkError("Connection failed: connection refused".into()),
            LlmError::Timeout,
            LlmError::ApiError("502 Bad Gateway".into()),
            LlmError::ProviderError("upstream overloaded".into()),
        ] {
            let e = classify_llm_error(&error);
            assert_eq!(kind_of(&e), ProviderErrorKind::Transport, "{error}");
            assert!(e.is_transient());
        }
    }

    #[test]
    fn token_limit_is_not_retried() {
        let e = classify_llm_error(&LlmError::TokenLimitExceeded {
            max: 1500,
            got: 2000,
        });
        assert_eq!(kind_of(&e), ProviderErrorKind::Other);
        assert!(!e.is_transient());
    }

    #[test]
    fn invalid_request_mentioning_numbers_is_not_retried() {
        let e = classify_llm_error(&LlmError::InvalidRequest(
            "image larger than 5000x5000".into(),
        ));
        assert_eq!(kind_of(&e), ProviderErrorKind::Other);
        assert!(!e.is_transient());
    }

    #[test]
    fn bad_json_is_malformed_response() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"choices\": [").unwrap_err();
        let e = classify_llm_error(&LlmError::SerializationError(json_err));
        assert_eq!(kind_of(&e), ProviderErrorKind::MalformedResponse);
        assert!(!e.is_transient());
    }

    #[test]
    fn detail_is_the_display_text() {
        let error = LlmError::ModelNotFound("gpt-9".into());
        match classify_llm_error(&error) {
            StageError::Provider { kind, detail } => {
                assert_eq!(kind, ProviderErrorKind::Other);
                assert_eq!(detail, "Model not found: gpt-9");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    fn sample_image() -> EncodedImage {
        EncodedImage {
            data: "iVBORw0KGgo=".into(),
            mime_type: "image/png".into(),
            width: 8,
            height: 4,
            original_width: 8,
            original_height: 4,
        }
    }

    #[test]
    fn transcription_request_carries_the_image() {
        let converted = to_chat_messages(&transcription_messages(sample_image(), None));

        assert_eq!(converted.len(), 1);
        let message = &converted[0];
        assert_eq!(message.role, ChatRole::User);
        assert_eq!(message.content, TRANSCRIPTION_PROMPT);

        let images = message.images.as_ref().expect("image attached");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, "iVBORw0KGgo=");
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].detail.as_deref(), Some("high"));
    }

    #[test]
    fn correction_request_is_system_then_user() {
        let converted = to_chat_messages(&correction_messages("I has a dog.", None));

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, ChatRole::System);
        assert_eq!(converted[0].content, CORRECTION_SYSTEM_PROMPT);
        assert_eq!(converted[1].role, ChatRole::User);
        assert!(converted[1].content.ends_with("I has a dog."));
        assert!(converted
            .iter()
            .all(|m| m.images.as_ref().map_or(true, Vec::is_empty)));
    }

    #[test]
    fn custom_prompt_replaces_the_default_instruction() {
        let converted = to_chat_messages(&transcription_messages(
            sample_image(),
            Some("Transcribe exactly."),
        ));
        assert_eq!(converted[0].content, "Transcribe exactly.");
    }
}
