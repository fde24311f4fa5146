//! Request orchestration shared by the web and CLI shells.
//!
//! One request runs a small state machine:
//!
//! ```text
//! Received ──normalize+transcribe──▶ failed / blank ──▶ TranscriptionFailed
//!                                  └─▶ Transcribed ──correct──▶ failed ──▶ CorrectionFailed
//!                                                              └─▶ Completed
//! anything unexpected ─────────────────────────────────────────▶ SystemError
//! ```
//!
//! [`Corrector::process`] never returns an error: whatever happens, the
//! caller gets a [`CorrectionReport`] it can render as-is.

use crate::config::{CorrectorConfig, ModelProfile};
use crate::error::CorrectorError;
use crate::pipeline::correct::correct;
use crate::pipeline::llm::ChatBackend;
use crate::pipeline::normalize::{normalize_image_blocking, UploadedImage};
use crate::pipeline::transcribe::transcribe;
use crate::progress::Stage;
use crate::prompts;
use crate::provider::{connect_backends, Backends};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Both stages succeeded.
    Completed,
    /// Transcription failed or produced only whitespace; correction skipped.
    TranscriptionFailed,
    /// Transcription succeeded, correction failed.
    CorrectionFailed,
    /// Something outside the model calls went wrong (bad upload, panic…).
    SystemError,
}

/// Everything a presentation shell needs to render one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub state: ProcessState,
    /// Transcription, or the failure description when it failed.
    pub transcribed_text: String,
    /// Correction, the skip placeholder, or the failure description.
    pub corrected_text: String,
    pub transcription_error: Option<String>,
    pub correction_error: Option<String>,
    /// Id of the profile used, if one was resolved.
    pub profile: Option<String>,
    pub file_name: Option<String>,
    /// Size actually sent to the model, when normalisation succeeded.
    pub image_size: Option<(u32, u32)>,
    pub total_duration_ms: u64,
}

impl CorrectionReport {
    pub fn is_completed(&self) -> bool {
        self.state == ProcessState::Completed
    }

    /// The shell-boundary fallback for anything unexpected.
    fn system_error(
        err: &CorrectorError,
        profile: Option<String>,
        file_name: Option<String>,
        total_duration_ms: u64,
    ) -> Self {
        Self {
            state: ProcessState::SystemError,
            transcribed_text: prompts::SYSTEM_ERROR_TRANSCRIPTION.to_string(),
            corrected_text: prompts::SYSTEM_ERROR_CORRECTION.to_string(),
            transcription_error: Some(prompts::system_error(&err.to_string())),
            correction_error: None,
            profile,
            file_name,
            image_size: None,
            total_duration_ms,
        }
    }
}

/// The pipeline: configuration plus connected model backends.
///
/// Cheap to share: wrap in an `Arc` and hand it to every request.
pub struct Corrector {
    config: CorrectorConfig,
    transcribers: HashMap<String, Arc<dyn ChatBackend>>,
    corrector: Arc<dyn ChatBackend>,
}

impl Corrector {
    /// Connect real providers for every configured profile.
    pub fn from_config(config: CorrectorConfig) -> Result<Self, CorrectorError> {
        let Backends {
            transcription,
            correction,
        } = connect_backends(&config)?;
        Self::with_backends(config, transcription, correction)
    }

    /// Assemble a corrector from pre-built backends.
    ///
    /// Every key in `transcribers` must name a configured profile; profiles
    /// without a backend are reported as unavailable.
    pub fn with_backends(
        config: CorrectorConfig,
        transcribers: HashMap<String, Arc<dyn ChatBackend>>,
        corrector: Arc<dyn ChatBackend>,
    ) -> Result<Self, CorrectorError> {
        if let Some(stray) = transcribers.keys().find(|id| config.profile(id).is_none()) {
            return Err(CorrectorError::InvalidConfig(format!(
                "Backend given for unknown profile '{stray}'"
            )));
        }
        if transcribers.is_empty() {
            return Err(CorrectorError::InvalidConfig(
                "At least one transcription backend is required".into(),
            ));
        }
        Ok(Self {
            config,
            transcribers,
            corrector,
        })
    }

    pub fn config(&self) -> &CorrectorConfig {
        &self.config
    }

    /// Profiles that have a connected backend, in configuration order.
    pub fn available_profiles(&self) -> Vec<&ModelProfile> {
        self.config
            .profiles
            .iter()
            .filter(|p| self.transcribers.contains_key(&p.id))
            .collect()
    }

    /// Resolve a requested profile id (or the default) to a usable profile.
    pub fn resolve_profile(&self, requested: Option<&str>) -> Result<&ModelProfile, CorrectorError> {
        let wanted = requested
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                let default = self.config.default_profile_id();
                self.transcribers
                    .contains_key(default)
                    .then(|| default.to_string())
            })
            .or_else(|| self.available_profiles().first().map(|p| p.id.clone()))
            .unwrap_or_default();

        self.available_profiles()
            .into_iter()
            .find(|p| p.id == wanted)
            .ok_or_else(|| CorrectorError::UnknownProfile {
                profile: wanted,
                available: self
                    .available_profiles()
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Run the full pipeline for one upload. Never fails; see module docs.
    pub async fn process(&self, upload: UploadedImage, profile: Option<&str>) -> CorrectionReport {
        let start = Instant::now();
        let file_name = upload.file_name.clone();
        info!(
            "Processing upload {:?} ({} bytes, declared {})",
            file_name.as_deref().unwrap_or("<unnamed>"),
            upload.bytes.len(),
            upload.content_type.as_deref().unwrap_or("no type")
        );

        match self.run(upload, profile, start).await {
            Ok(report) => {
                info!(
                    "Request finished: {:?} in {}ms",
                    report.state, report.total_duration_ms
                );
                report
            }
            Err(e) => {
                error!("System error while processing {:?}: {}", file_name, e);
                CorrectionReport::system_error(
                    &e,
                    profile.map(str::to_string),
                    file_name,
                    start.elapsed().as_millis() as u64,
                )
            }
        }
    }

    async fn run(
        &self,
        upload: UploadedImage,
        requested_profile: Option<&str>,
        start: Instant,
    ) -> Result<CorrectionReport, CorrectorError> {
        let profile = self.resolve_profile(requested_profile)?;
        let transcriber = self
            .transcribers
            .get(&profile.id)
            .ok_or_else(|| CorrectorError::Internal(format!("no backend for '{}'", profile.id)))?;
        let policy = self.config.invocation_policy();
        let observer = self.config.observer.as_deref();
        let file_name = upload.file_name.clone();
        let declared_type = upload.content_type.clone();

        if upload.bytes.is_empty() {
            return Err(CorrectorError::EmptyUpload);
        }
        if upload.bytes.len() > self.config.max_upload_bytes {
            return Err(CorrectorError::ImageTooLarge {
                size: upload.bytes.len(),
                limit: self.config.max_upload_bytes,
            });
        }

        // ── Step 1: Normalize ────────────────────────────────────────────
        if let Some(obs) = observer {
            obs.on_stage_start(Stage::Normalize);
        }
        let image = match normalize_image_blocking(upload.bytes, profile.max_dimension).await {
            Ok(image) => image,
            Err(e) => {
                let e = match (e, declared_type) {
                    (CorrectorError::Decode { detail }, Some(declared)) => CorrectorError::Decode {
                        detail: format!("{detail} (declared as {declared})"),
                    },
                    (e, _) => e,
                };
                if let Some(obs) = observer {
                    obs.on_stage_error(Stage::Normalize, &e.to_string());
                }
                return Err(e);
            }
        };
        if let Some(obs) = observer {
            obs.on_stage_complete(Stage::Normalize, image.data.len());
        }
        let image_size = Some((image.width, image.height));

        let mut report = CorrectionReport {
            state: ProcessState::Completed,
            transcribed_text: String::new(),
            corrected_text: String::new(),
            transcription_error: None,
            correction_error: None,
            profile: Some(profile.id.clone()),
            file_name,
            image_size,
            total_duration_ms: 0,
        };

        // ── Step 2: Transcribe ───────────────────────────────────────────
        if let Some(obs) = observer {
            obs.on_stage_start(Stage::Transcription);
        }
        let transcription = transcribe(
            transcriber.as_ref(),
            profile,
            image,
            self.config.transcription_prompt.as_deref(),
            &policy,
        )
        .await;

        let transcribed = match transcription {
            Ok(c) if !c.text.trim().is_empty() => c.text,
            other => {
                let message = match other {
                    Err(e) => prompts::transcription_failed(&e.to_string()),
                    Ok(_) => prompts::EMPTY_TRANSCRIPTION.to_string(),
                };
                if let Some(obs) = observer {
                    obs.on_stage_error(Stage::Transcription, &message);
                    obs.on_stage_skipped(Stage::Correction);
                }
                report.state = ProcessState::TranscriptionFailed;
                report.transcribed_text = message.clone();
                report.transcription_error = Some(message);
                report.corrected_text = prompts::CORRECTION_SKIPPED.to_string();
                report.total_duration_ms = start.elapsed().as_millis() as u64;
                return Ok(report);
            }
        };
        if let Some(obs) = observer {
            obs.on_stage_complete(Stage::Transcription, transcribed.len());
        }
        debug!("Transcribed {} chars", transcribed.len());

        // ── Step 3: Correct ──────────────────────────────────────────────
        if let Some(obs) = observer {
            obs.on_stage_start(Stage::Correction);
        }
        let correction = correct(
            self.corrector.as_ref(),
            &self.config.correction,
            &transcribed,
            self.config.correction_prompt.as_deref(),
            &policy,
        )
        .await;
        report.transcribed_text = transcribed;

        match correction {
            Ok(c) => {
                if let Some(obs) = observer {
                    obs.on_stage_complete(Stage::Correction, c.text.len());
                }
                report.corrected_text = c.text;
            }
            Err(e) => {
                let message = prompts::correction_failed(&e.to_string());
                if let Some(obs) = observer {
                    obs.on_stage_error(Stage::Correction, &message);
                }
                report.state = ProcessState::CorrectionFailed;
                report.corrected_text = message.clone();
                report.correction_error = Some(message);
            }
        }

        report.total_duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProfile;
    use crate::error::{ProviderErrorKind, StageError};
    use crate::pipeline::llm::tests::ScriptedBackend;
    use crate::pipeline::llm::ModelReply;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([250, 250, 250])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn config() -> CorrectorConfig {
        CorrectorConfig::builder()
            .max_retries(0)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn corrector(
        transcriber: Arc<ScriptedBackend>,
        correction: Arc<ScriptedBackend>,
    ) -> Corrector {
        let mut map: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
        map.insert("openai".into(), transcriber);
        Corrector::with_backends(config(), map, correction).unwrap()
    }

    #[tokio::test]
    async fn completed_path() {
        let t = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("I has a cat."))]));
        let c = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("- Error: has"))]));
        let report = corrector(t.clone(), c.clone())
            .process(UploadedImage::new(png(20, 10)).with_file_name("essay.png"), None)
            .await;

        assert_eq!(report.state, ProcessState::Completed);
        assert_eq!(report.transcribed_text, "I has a cat.");
        assert_eq!(report.corrected_text, "- Error: has");
        assert_eq!(report.profile.as_deref(), Some("openai"));
        assert_eq!(report.file_name.as_deref(), Some("essay.png"));
        assert_eq!(report.image_size, Some((20, 10)));
        assert_eq!(t.call_count(), 1);
        assert_eq!(c.call_count(), 1);
    }

    #[tokio::test]
    async fn correction_failure_keeps_transcription() {
        let t = Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::text("Hello"))]));
        let c = Arc::new(ScriptedBackend::new(vec![Err(StageError::Provider {
            kind: ProviderErrorKind::Other,
            detail: "quota exceeded".into(),
        })]));
        let report = corrector(t, c)
            .process(UploadedImage::new(png(8, 8)), None)
            .await;

        assert_eq!(report.state, ProcessState::CorrectionFailed);
        assert_eq!(report.transcribed_text, "Hello");
        assert!(report.transcription_error.is_none());
        let err = report.correction_error.unwrap();
        assert!(err.contains("quota exceeded"));
        assert_eq!(report.corrected_text, err);
    }

    #[tokio::test]
    async fn undecodable_upload_is_system_error() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let report = corrector(t.clone(), c.clone())
            .process(UploadedImage::new(b"%PDF-1.7".to_vec()), None)
            .await;

        assert_eq!(report.state, ProcessState::SystemError);
        assert_eq!(report.transcribed_text, prompts::SYSTEM_ERROR_TRANSCRIPTION);
        assert_eq!(report.corrected_text, prompts::SYSTEM_ERROR_CORRECTION);
        assert!(report
            .transcription_error
            .unwrap()
            .starts_with("Error del sistema al procesar el archivo"));
        assert_eq!(t.call_count(), 0);
        assert_eq!(c.call_count(), 0);
    }

    #[tokio::test]
    async fn declared_type_is_reported_when_decoding_fails() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let upload =
            UploadedImage::new(b"ftypheic-not-really".to_vec()).with_content_type("image/heic");
        let report = corrector(t.clone(), c).process(upload, None).await;

        assert_eq!(report.state, ProcessState::SystemError);
        let err = report.transcription_error.unwrap();
        assert!(err.contains("declared as image/heic"), "got: {err}");
        assert_eq!(t.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_system_error() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let report = corrector(t, c).process(UploadedImage::new(Vec::new()), None).await;
        assert_eq!(report.state, ProcessState::SystemError);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_decoding() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let mut map: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
        map.insert("openai".into(), t.clone());
        let cfg = CorrectorConfig::builder().max_upload_bytes(16).build().unwrap();
        let report = Corrector::with_backends(cfg, map, c)
            .unwrap()
            .process(UploadedImage::new(png(8, 8)), None)
            .await;
        assert_eq!(report.state, ProcessState::SystemError);
        assert!(report.transcription_error.unwrap().contains("upload limit"));
        assert_eq!(t.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_profile_is_system_error() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let report = corrector(t, c)
            .process(UploadedImage::new(png(8, 8)), Some("mistral"))
            .await;
        assert_eq!(report.state, ProcessState::SystemError);
        assert!(report.transcription_error.unwrap().contains("mistral"));
    }

    #[test]
    fn profiles_without_backend_are_unavailable() {
        let t = Arc::new(ScriptedBackend::new(vec![]));
        let c = Arc::new(ScriptedBackend::new(vec![]));
        let corrector = corrector(t, c);
        let ids: Vec<&str> = corrector
            .available_profiles()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["openai"]);
        assert!(corrector.resolve_profile(Some("groq")).is_err());
        assert_eq!(corrector.resolve_profile(None).unwrap().id, "openai");
        assert_eq!(corrector.resolve_profile(Some("")).unwrap().id, "openai");
    }

    #[test]
    fn default_falls_back_to_first_available() {
        let mut map: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
        map.insert("groq".into(), Arc::new(ScriptedBackend::new(vec![])));
        let corrector =
            Corrector::with_backends(config(), map, Arc::new(ScriptedBackend::new(vec![]))).unwrap();
        assert_eq!(corrector.resolve_profile(None).unwrap().id, "groq");
    }

    #[test]
    fn stray_backend_is_rejected() {
        let mut map: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
        map.insert("nope".into(), Arc::new(ScriptedBackend::new(vec![])));
        let err = Corrector::with_backends(
            config(),
            map,
            Arc::new(ScriptedBackend::new(vec![])),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn groq_profile_uses_its_own_threshold() {
        assert_eq!(ModelProfile::groq_llama_vision().max_dimension, 1500);
    }
}
