//! Observer trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::CorrectorConfigBuilder::observer`] to receive events as
//! a request moves through normalisation, transcription and correction.
//! The CLI drives its terminal spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use essay_corrector::{PipelineObserver, Stage, CorrectorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_stage_complete(&self, stage: Stage, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done ({chars} chars)");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { completed: AtomicUsize::new(0) });
//!
//! let config = CorrectorConfig::builder()
//!     .observer(observer as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three steps of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Transcription,
    Correction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Stage::Normalize => "normalize",
            Stage::Transcription => "transcription",
            Stage::Correction => "correction",
        })
    }
}

/// Called by the pipeline as it processes a request.
///
/// Implementations must be `Send + Sync`: the web shell shares one observer
/// across every concurrent request. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// Called just before a stage starts.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage succeeds.
    ///
    /// `chars` is the length of the produced text (base64 length for
    /// [`Stage::Normalize`]).
    fn on_stage_complete(&self, stage: Stage, chars: usize) {
        let _ = (stage, chars);
    }

    /// Called when a stage fails.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called when a stage is not run because an earlier one failed.
    fn on_stage_skipped(&self, stage: Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::CorrectorConfig`].
pub type PipelineObserverRef = Arc<dyn PipelineObserver>;
