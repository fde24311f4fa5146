//! HTML rendering with minijinja.
//!
//! Templates are compiled into the binary with `include_str!` so the server
//! has no runtime dependency on a `templates/` directory. Names ending in
//! `.html` get minijinja's HTML auto-escaping, which is what keeps a model
//! answer containing `<script>` inert.

use crate::error::CorrectorError;
use minijinja::Environment;
use serde::Serialize;

pub const INDEX: &str = "index.html";
pub const CORRECTION_RESULTS: &str = "partials/correction_results.html";
pub const LAST_RESULT: &str = "partials/last_result.html";
pub const ALERT: &str = "partials/alert.html";

/// The compiled template set.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, CorrectorError> {
        let mut env = Environment::new();
        env.add_template(INDEX, include_str!("../../templates/index.html"))?;
        env.add_template(
            CORRECTION_RESULTS,
            include_str!("../../templates/partials/correction_results.html"),
        )?;
        env.add_template(
            LAST_RESULT,
            include_str!("../../templates/partials/last_result.html"),
        )?;
        env.add_template(ALERT, include_str!("../../templates/partials/alert.html"))?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, CorrectorError> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }
}
