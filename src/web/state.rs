//! Application state shared across routes.

use crate::corrector::Corrector;
use crate::error::CorrectorError;
use crate::session::LastResult;
use crate::web::templates::Templates;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub corrector: Arc<Corrector>,
    pub last_result: LastResult,
    pub templates: Arc<Templates>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(corrector: Arc<Corrector>) -> Result<Self, CorrectorError> {
        Ok(Self {
            corrector,
            last_result: LastResult::new(),
            templates: Arc::new(Templates::new()?),
            started_at: Instant::now(),
        })
    }
}
