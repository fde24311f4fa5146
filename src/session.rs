//! The best-effort "last result" slot.
//!
//! The web page redisplays the most recent successful transcription on
//! reload, without re-running the pipeline. It is a single slot shared by
//! every visitor: last writer wins, nothing is persisted, and a poisoned lock
//! is simply recovered because a stale value is acceptable here.

use crate::corrector::CorrectionReport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// What the slot remembers about a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastResultEntry {
    pub transcribed_text: String,
    pub corrected_text: String,
    pub profile: Option<String>,
    pub file_name: Option<String>,
}

/// Shared, cloneable handle to the slot.
#[derive(Debug, Clone, Default)]
pub struct LastResult {
    inner: Arc<RwLock<Option<LastResultEntry>>>,
}

impl LastResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the report if (and only if) it completed. Returns whether it did.
    pub fn record(&self, report: &CorrectionReport) -> bool {
        if !report.is_completed() {
            return false;
        }
        let entry = LastResultEntry {
            transcribed_text: report.transcribed_text.clone(),
            corrected_text: report.corrected_text.clone(),
            profile: report.profile.clone(),
            file_name: report.file_name.clone(),
        };
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(entry);
        true
    }

    pub fn get(&self) -> Option<LastResultEntry> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
