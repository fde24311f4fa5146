//! Routes and handlers for the HTMX web shell.
//!
//! The page posts the upload form to `/upload-and-correct/` and swaps the
//! returned fragment into `#results`. Handlers only translate between HTTP
//! and [`crate::Corrector`]; all pipeline decisions live there.

use crate::error::CorrectorError;
use crate::pipeline::normalize::UploadedImage;
use crate::prompts;
use crate::web::state::AppState;
use crate::web::templates::{ALERT, CORRECTION_RESULTS, INDEX, LAST_RESULT};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use minijinja::context;
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// Room for multipart boundaries and the small text fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the application router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let body_limit = state.corrector.config().max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(index))
        .route("/upload-and-correct/", post(upload_and_correct))
        .route("/last-result", get(last_result))
        .route("/last-result/download", get(download_last_result))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Handler-level error: rendered as a plain 500.
pub struct AppError(CorrectorError);

impl From<CorrectorError> for AppError {
    fn from(e: CorrectorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Handler failed: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

#[derive(Serialize)]
struct ProfileOption<'a> {
    id: &'a str,
    label: &'a str,
}

/// `GET /`: the full page, with the previous result if there is one.
async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let corrector = &state.corrector;
    let profiles: Vec<ProfileOption<'_>> = corrector
        .available_profiles()
        .into_iter()
        .map(|p| ProfileOption {
            id: &p.id,
            label: &p.label,
        })
        .collect();
    let default_profile = corrector
        .resolve_profile(None)
        .map(|p| p.id.clone())
        .unwrap_or_default();

    let html = state.templates.render(
        INDEX,
        context! {
            app_title => &corrector.config().app_title,
            profiles => profiles,
            default_profile => default_profile,
            last_result => state.last_result.get(),
            empty_message => prompts::NO_PREVIOUS_RESULT,
        },
    )?;
    Ok(Html(html))
}

/// `POST /upload-and-correct/`: run the pipeline, return the result fragment.
async fn upload_and_correct(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (upload, profile) = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let status = e.status();
            return alert(&state, status, &e.body_text());
        }
    };

    let Some(upload) = upload else {
        return alert(&state, StatusCode::BAD_REQUEST, prompts::MISSING_IMAGE);
    };

    if let Err(e) = state.corrector.resolve_profile(profile.as_deref()) {
        return alert(&state, StatusCode::BAD_REQUEST, &e.to_string());
    }

    info!(
        "Upload received: {:?} ({} bytes, profile {:?})",
        upload.file_name,
        upload.bytes.len(),
        profile
    );
    let report = state.corrector.process(upload, profile.as_deref()).await;
    state.last_result.record(&report);

    let html = state
        .templates
        .render(CORRECTION_RESULTS, context! { report => report })?;
    Ok(Html(html).into_response())
}

/// `GET /last-result`: fragment with the previous transcription.
async fn last_result(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let html = state.templates.render(
        LAST_RESULT,
        context! {
            last_result => state.last_result.get(),
            empty_message => prompts::NO_PREVIOUS_RESULT,
        },
    )?;
    Ok(Html(html))
}

/// `GET /last-result/download`: the previous transcription as a text file.
async fn download_last_result(State(state): State<AppState>) -> Response {
    match state.last_result.get() {
        Some(entry) => (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"texto_extraido.txt\"",
                ),
            ],
            entry.transcribed_text,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, prompts::NO_PREVIOUS_RESULT).into_response(),
    }
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    profiles: Vec<String>,
    uptime_seconds: u64,
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        profiles: state
            .corrector
            .available_profiles()
            .iter()
            .map(|p| p.id.clone())
            .collect(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Pull the image and the optional profile out of the multipart form.
///
/// An empty file field (the browser sends one when nothing was chosen)
/// counts as no image.
async fn read_form(
    mut multipart: Multipart,
) -> Result<(Option<UploadedImage>, Option<String>), MultipartError> {
    let mut upload = None;
    let mut profile = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "essay_image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    upload = Some(UploadedImage {
                        bytes: bytes.to_vec(),
                        content_type,
                        file_name,
                    });
                }
            }
            "profile" => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    profile = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    Ok((upload, profile))
}

fn alert(state: &AppState, status: StatusCode, message: &str) -> Result<Response, AppError> {
    let html = state.templates.render(ALERT, context! { message => message })?;
    Ok((status, Html(html)).into_response())
}
