//! CLI binary for essay-corrector.
//!
//! `serve` starts the web page; `process` runs one image through the same
//! pipeline and prints the result. Both map flags onto `CorrectorConfig`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use essay_corrector::web::{self, AppState};
use essay_corrector::{
    resolve_input, CorrectionReport, Corrector, CorrectorConfig, PipelineObserver,
    PipelineObserverRef, ProcessState, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal spinner driven by pipeline stage events.
struct SpinnerObserver {
    bar: ProgressBar,
    start_times: Mutex<HashMap<Stage, Instant>>,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, stage: Stage) -> String {
        let secs = self
            .start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&stage)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for SpinnerObserver {
    fn on_stage_start(&self, stage: Stage) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage, Instant::now());
        let msg = match stage {
            Stage::Normalize => "Preparing image…",
            Stage::Transcription => "Transcribing handwriting…",
            Stage::Correction => "Correcting essay…",
        };
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(msg);
    }

    fn on_stage_complete(&self, stage: Stage, chars: usize) {
        self.bar.println(format!(
            "  {} {:<14} {:<14} {}",
            green("✓"),
            stage,
            dim(&format!("{chars:>6} chars")),
            self.elapsed(stage),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<14} {}  {}",
            red("✗"),
            stage,
            red(&msg),
            self.elapsed(stage),
        ));
    }

    fn on_stage_skipped(&self, stage: Stage) {
        self.bar
            .println(format!("  {} {:<14} {}", yellow("–"), stage, dim("skipped")));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the web page on http://127.0.0.1:8000
  essay-corrector serve

  # Listen on all interfaces
  essay-corrector serve --addr 0.0.0.0:8080

  # Correct one photo from the terminal
  essay-corrector process redaccion.jpg

  # Use the Groq vision model and print JSON
  essay-corrector process --profile groq --json redaccion.png > result.json

  # From a URL
  essay-corrector process https://example.com/essay.jpg

PROFILES:
  Id       Label                                    Max side  Temperature
  ──────   ───────────────────────────────────────  ────────  ───────────
  openai   OpenAI GPT-4o-mini (default)             1000 px   1.0
  groq     Groq LLM: llama-3.2-90b-vision-preview   1500 px   0.5

  A profile whose API key is missing is not offered.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY     OpenAI API key (transcription profile + correction)
  GROQ_API_KEY       Groq API key
  APP_TITLE          Web page title
  RUST_LOG           Log filter, overrides --verbose / --quiet
"#;

/// Transcribe and correct handwritten essays with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "essay-corrector",
    version,
    about = "Transcribe handwritten essays from photos and correct them with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ESSAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "ESSAY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web page.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "ESSAY_ADDR", default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },

    /// Transcribe and correct one image (local path or HTTP/HTTPS URL).
    Process {
        /// Local PNG/JPEG path or HTTP/HTTPS URL.
        input: String,

        /// Transcription profile id (openai, groq).
        #[arg(short, long, env = "ESSAY_PROFILE")]
        profile: Option<String>,

        /// Output the full report as JSON.
        #[arg(long, env = "ESSAY_JSON")]
        json: bool,

        /// Disable the progress spinner.
        #[arg(long, env = "ESSAY_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Profile used when a request does not pick one.
    #[arg(long, global = true, env = "ESSAY_DEFAULT_PROFILE")]
    default_profile: Option<String>,

    /// Provider for the correction stage.
    #[arg(long, global = true, env = "ESSAY_CORRECTION_PROVIDER", default_value = "openai")]
    correction_provider: String,

    /// Model for the correction stage.
    #[arg(long, global = true, env = "ESSAY_CORRECTION_MODEL", default_value = "gpt-3.5-turbo")]
    correction_model: String,

    /// Path to a text file replacing the transcription instruction.
    #[arg(long, global = true, env = "ESSAY_TRANSCRIPTION_PROMPT")]
    transcription_prompt: Option<PathBuf>,

    /// Path to a text file replacing the correction rubric.
    #[arg(long, global = true, env = "ESSAY_CORRECTION_PROMPT")]
    correction_prompt: Option<PathBuf>,

    /// Per-model-call timeout in seconds.
    #[arg(long, global = true, env = "ESSAY_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries after a transient model failure.
    #[arg(long, global = true, env = "ESSAY_MAX_RETRIES", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, global = true, env = "ESSAY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, global = true, env = "ESSAY_MAX_UPLOAD_MB", default_value_t = 20,
          value_parser = clap::value_parser!(u32).range(1..=200))]
    max_upload_mb: u32,

    /// Title shown on the web page.
    #[arg(long, global = true, env = "APP_TITLE", default_value = "Asistente de Corrección")]
    app_title: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a `process` run needs, so library
    // logs are limited to errors while it is shown.
    let show_progress = match &cli.command {
        Command::Process {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { addr } => {
            let config = build_config(&cli.pipeline, None).await?;
            let corrector =
                Corrector::from_config(config).context("Failed to connect model providers")?;
            let profiles: Vec<String> = corrector
                .available_profiles()
                .iter()
                .map(|p| p.id.clone())
                .collect();
            if !cli.quiet {
                eprintln!(
                    "{} Serving on {}  {}",
                    green("◆"),
                    bold(&format!("http://{addr}")),
                    dim(&format!("profiles: {}", profiles.join(", "))),
                );
            }
            let state = AppState::new(Arc::new(corrector)).context("Failed to load templates")?;
            web::serve(addr, state).await.context("Server failed")?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Process {
            input,
            profile,
            json,
            ..
        } => {
            let spinner = show_progress.then(SpinnerObserver::new);
            let observer = spinner.clone().map(|s| s as PipelineObserverRef);

            let config = build_config(&cli.pipeline, observer).await?;
            let download_timeout = config.download_timeout_secs;
            let max_upload_bytes = config.max_upload_bytes;
            let corrector =
                Corrector::from_config(config).context("Failed to connect model providers")?;

            let upload = resolve_input(&input, download_timeout, max_upload_bytes)
                .await
                .with_context(|| format!("Failed to read '{input}'"))?;
            let report = corrector.process(upload, profile.as_deref()).await;

            if let Some(s) = &spinner {
                s.finish();
            }

            if json {
                let out =
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
                println!("{out}");
            } else {
                print_report(&report).context("Failed to write to stdout")?;
            }

            if !cli.quiet && !json {
                print_summary(&report);
            }

            Ok(match report.state {
                ProcessState::Completed => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
    }
}

/// Map CLI args to `CorrectorConfig`.
async fn build_config(
    args: &PipelineArgs,
    observer: Option<PipelineObserverRef>,
) -> Result<CorrectorConfig> {
    let mut builder = CorrectorConfig::builder()
        .correction_model(&args.correction_provider, &args.correction_model)
        .api_timeout_secs(args.api_timeout)
        .max_retries(args.max_retries)
        .download_timeout_secs(args.download_timeout)
        .max_upload_bytes(args.max_upload_mb as usize * 1024 * 1024)
        .app_title(&args.app_title);

    if let Some(id) = &args.default_profile {
        builder = builder.default_profile(id);
    }
    if let Some(path) = &args.transcription_prompt {
        builder = builder.transcription_prompt(read_prompt(path).await?);
    }
    if let Some(path) = &args.correction_prompt {
        builder = builder.correction_prompt(read_prompt(path).await?);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}

/// Print both texts to stdout, section by section.
fn print_report(report: &CorrectionReport) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", bold("── Texto transcrito ──"))?;
    writeln!(out, "{}", report.transcribed_text.trim_end())?;
    writeln!(out)?;
    writeln!(out, "{}", bold("── Corrección ──"))?;
    writeln!(out, "{}", report.corrected_text.trim_end())?;
    Ok(())
}

fn print_summary(report: &CorrectionReport) {
    let (mark, label) = match report.state {
        ProcessState::Completed => (green("✔"), "completed"),
        ProcessState::TranscriptionFailed => (red("✘"), "transcription failed"),
        ProcessState::CorrectionFailed => (yellow("⚠"), "correction failed"),
        ProcessState::SystemError => (red("✘"), "system error"),
    };
    let size = report
        .image_size
        .map(|(w, h)| format!("{w}×{h}"))
        .unwrap_or_else(|| "-".into());
    eprintln!(
        "{}  {}  profile {}  image {}  {}ms",
        mark,
        bold(label),
        report.profile.as_deref().unwrap_or("-"),
        size,
        report.total_duration_ms,
    );
}
