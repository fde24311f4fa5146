//! Configuration types for the transcription + correction pipeline.
//!
//! All behaviour is controlled through [`CorrectorConfig`], built via its
//! [`CorrectorConfigBuilder`]. The config is constructed once at process
//! start, validated, and then handed to [`crate::Corrector`]; nothing in the
//! library reads global state after that point.

use crate::error::CorrectorError;
use crate::progress::PipelineObserverRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Largest accepted [`CorrectorConfig::max_retries`].
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// A selectable vision model used for the transcription stage.
///
/// Each profile carries its own maximum image dimension: some providers
/// accept larger images than others, and sending more pixels than the model
/// can use only costs tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Stable identifier used by the web form and the CLI (`openai`, `groq`).
    pub id: String,
    /// Human-readable label shown in the selector.
    pub label: String,
    /// edgequake-llm provider name (`openai`, `groq`, `anthropic`, …).
    pub provider: String,
    /// Model identifier understood by the provider.
    pub model: String,
    /// Longest image side in pixels before the image is downscaled.
    pub max_dimension: u32,
    /// Sampling temperature for the transcription call.
    pub temperature: f32,
    /// Output token cap. `None` leaves the provider default in place.
    pub max_tokens: Option<usize>,
}

impl ModelProfile {
    /// OpenAI `gpt-4o-mini`, images capped at 1000 px.
    pub fn openai_gpt4o_mini() -> Self {
        Self {
            id: "openai".into(),
            label: "OpenAI GPT-4o-mini".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            max_dimension: 1000,
            temperature: 1.0,
            max_tokens: Some(1000),
        }
    }

    /// Groq `llama-3.2-90b-vision-preview`, images capped at 1500 px.
    pub fn groq_llama_vision() -> Self {
        Self {
            id: "groq".into(),
            label: "Groq LLM: llama-3.2-90b-vision-preview".into(),
            provider: "groq".into(),
            model: "llama-3.2-90b-vision-preview".into(),
            max_dimension: 1500,
            temperature: 0.5,
            max_tokens: None,
        }
    }
}

/// The text model used for the correction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionModel {
    pub provider: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl Default for CorrectionModel {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-3.5-turbo".into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Configuration for the essay-corrector pipeline and its shells.
///
/// # Example
/// ```rust
/// use essay_corrector::CorrectorConfig;
///
/// let config = CorrectorConfig::builder()
///     .api_timeout_secs(30)
///     .max_retries(2)
///     .default_profile("groq")
///     .build()
///     .unwrap();
/// assert_eq!(config.default_profile_id(), "groq");
/// ```
#[derive(Clone)]
pub struct CorrectorConfig {
    /// Transcription profiles offered to the user. Default: OpenAI + Groq.
    pub profiles: Vec<ModelProfile>,

    /// Profile used when the request does not name one. Default: the first.
    pub default_profile: Option<String>,

    /// Model used for the correction stage.
    pub correction: CorrectionModel,

    /// Custom transcription instruction. If None, uses the built-in prompt.
    pub transcription_prompt: Option<String>,

    /// Custom correction rubric. If None, uses the built-in rubric.
    pub correction_prompt: Option<String>,

    /// Per-model-call timeout in seconds. Default: 60.
    ///
    /// Hosted models occasionally hang on a half-open connection. Without a
    /// bound the request task would wait forever.
    pub api_timeout_secs: u64,

    /// Retries after a transient failure (timeout, 429, 5xx). Default: 1,
    /// at most [`MAX_RETRIES_LIMIT`].
    ///
    /// Authentication and bad-request errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Download timeout for URL inputs (CLI) in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// Title shown on the web page. Default: "Asistente de Corrección".
    pub app_title: String,

    /// Optional observer notified as each stage starts and finishes.
    pub observer: Option<PipelineObserverRef>,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            profiles: vec![
                ModelProfile::openai_gpt4o_mini(),
                ModelProfile::groq_llama_vision(),
            ],
            default_profile: None,
            correction: CorrectionModel::default(),
            transcription_prompt: None,
            correction_prompt: None,
            api_timeout_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 500,
            download_timeout_secs: 120,
            max_upload_bytes: 20 * 1024 * 1024,
            app_title: "Asistente de Corrección".into(),
            observer: None,
        }
    }
}

impl fmt::Debug for CorrectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrectorConfig")
            .field("profiles", &self.profiles)
            .field("default_profile", &self.default_profile)
            .field("correction", &self.correction)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("app_title", &self.app_title)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl CorrectorConfig {
    /// Create a new builder for `CorrectorConfig`.
    pub fn builder() -> CorrectorConfigBuilder {
        CorrectorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Look up a profile by id.
    pub fn profile(&self, id: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Id of the profile used when a request does not select one.
    pub fn default_profile_id(&self) -> &str {
        self.default_profile
            .as_deref()
            .or_else(|| self.profiles.first().map(|p| p.id.as_str()))
            .unwrap_or_default()
    }

    /// Timeout and retry knobs applied to every model call.
    pub fn invocation_policy(&self) -> InvocationPolicy {
        InvocationPolicy {
            timeout: Duration::from_secs(self.api_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Timeout and retry settings for a single model invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

/// Builder for [`CorrectorConfig`].
#[derive(Debug)]
pub struct CorrectorConfigBuilder {
    config: CorrectorConfig,
}

impl CorrectorConfigBuilder {
    /// Replace the whole profile list.
    pub fn profiles(mut self, profiles: Vec<ModelProfile>) -> Self {
        self.config.profiles = profiles;
        self
    }

    /// Add a profile, replacing any existing one with the same id.
    pub fn profile(mut self, profile: ModelProfile) -> Self {
        self.config.profiles.retain(|p| p.id != profile.id);
        self.config.profiles.push(profile);
        self
    }

    pub fn default_profile(mut self, id: impl Into<String>) -> Self {
        self.config.default_profile = Some(id.into());
        self
    }

    pub fn correction_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.config.correction.provider = provider.into();
        self.config.correction.model = model.into();
        self
    }

    pub fn correction_temperature(mut self, t: f32) -> Self {
        self.config.correction.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn correction_max_tokens(mut self, n: usize) -> Self {
        self.config.correction.max_tokens = Some(n);
        self
    }

    pub fn transcription_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.transcription_prompt = Some(prompt.into());
        self
    }

    pub fn correction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.correction_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn app_title(mut self, title: impl Into<String>) -> Self {
        self.config.app_title = title.into();
        self
    }

    pub fn observer(mut self, observer: PipelineObserverRef) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CorrectorConfig, CorrectorError> {
        let c = &self.config;
        if c.profiles.is_empty() {
            return Err(CorrectorError::InvalidConfig(
                "At least one model profile is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for p in &c.profiles {
            if p.id.trim().is_empty() {
                return Err(CorrectorError::InvalidConfig("Profile id must not be empty".into()));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(CorrectorError::InvalidConfig(format!(
                    "Duplicate profile id '{}'",
                    p.id
                )));
            }
            if p.max_dimension < 16 {
                return Err(CorrectorError::InvalidConfig(format!(
                    "Profile '{}': max_dimension must be ≥ 16, got {}",
                    p.id, p.max_dimension
                )));
            }
        }

        if let Some(ref id) = c.default_profile {
            if c.profile(id).is_none() {
                return Err(CorrectorError::InvalidConfig(format!(
                    "Default profile '{id}' is not among the configured profiles"
                )));
            }
        }
        if c.api_timeout_secs == 0 {
            return Err(CorrectorError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(CorrectorError::InvalidConfig("Upload limit must be > 0".into()));
        }
        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(CorrectorError::InvalidConfig(format!(
                "max_retries is {}, must be ≤ {MAX_RETRIES_LIMIT}",
                c.max_retries
            )));
        }
        Ok(self.config)
    }
}
