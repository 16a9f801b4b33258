//! CLI binary for label-explain.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExplainConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use label_explain::{
    AudioArtifact, ExplainConfig, ExplainOutput, Explainer, Language, PipelineOutcome,
    PipelineStage, ProgressCallback, StageProgressCallback, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner fed by stage transitions. Several images may be in
/// flight at once, so it shows the latest stage plus a finished count.
struct CliProgressCallback {
    bar: ProgressBar,
    total: usize,
    finished: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(format!("0/{total}"));
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            total,
            finished: AtomicUsize::new(0),
        })
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: PipelineStage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        // Audio comes after an explanation that was already counted.
        if matches!(stage, PipelineStage::AudioReady | PipelineStage::SynthFailed) {
            return;
        }
        let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_prefix(format!("{done}/{}", self.total));
        let mark = if stage == PipelineStage::Explained {
            green("✓")
        } else {
            red("✗")
        };
        self.bar.println(format!(
            "  {mark} {:<18} {}",
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0))
        ));
    }
}

const DISCLAIMER: &str = "This explanation only restates what is printed on the label. \
It is not medical advice; ask a pharmacist or doctor if anything is unclear.";

const AFTER_HELP: &str = r#"EXAMPLES:
  # Explain one label in English
  label-explain label.jpg

  # Explain in Tamil and read it aloud
  label-explain --language tamil --speak label.jpg

  # Several photos at once, also showing what OCR read
  label-explain --show-text --concurrency 4 front.jpg back.jpg

  # Use another local model
  label-explain --model llama3.2 label.png

  # Machine-readable output
  label-explain --json label.jpg > result.json

ENVIRONMENT VARIABLES:
  OLLAMA_HOST                  Ollama address, used when --endpoint is not set
  LABEL_EXPLAIN_ENDPOINT       Same as --endpoint
  LABEL_EXPLAIN_MODEL          Same as --model
  LABEL_EXPLAIN_LANGUAGE       Same as --language
  RUST_LOG                     Log filter (overrides -v / -q)

SETUP:
  1. Install tesseract and espeak-ng from your package manager.
  2. Start the model server:   ollama serve
  3. Pull a model:             ollama pull mistral
  4. Explain:                  label-explain label.jpg
"#;

/// Explain medicine labels in plain language using a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "label-explain",
    version,
    about = "Explain medicine labels in plain language using a local LLM",
    long_about = "Read a photo of a medicine label with OCR and explain it in simple English or \
Tamil using a local Ollama model. Dosages and warnings are kept exactly as printed. \
Optionally reads the explanation aloud with espeak-ng.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Label photos (PNG or JPEG).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Explanation language.
    #[arg(short, long, env = "LABEL_EXPLAIN_LANGUAGE", value_enum, default_value = "english")]
    language: LanguageArg,

    /// Ollama model name.
    #[arg(short, long, env = "LABEL_EXPLAIN_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Ollama base URL. Falls back to OLLAMA_HOST, then http://localhost:11434.
    #[arg(long, env = "LABEL_EXPLAIN_ENDPOINT")]
    endpoint: Option<String>,

    /// Generation timeout in seconds.
    #[arg(long, env = "LABEL_EXPLAIN_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Tesseract language pack for OCR.
    #[arg(long, env = "LABEL_EXPLAIN_OCR_LANGUAGE", default_value = "eng")]
    ocr_language: String,

    /// Render each explanation to an audio file.
    #[arg(short, long, env = "LABEL_EXPLAIN_SPEAK")]
    speak: bool,

    /// Directory for audio files (default: system temp dir).
    #[arg(long, env = "LABEL_EXPLAIN_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    /// Also print the text OCR read from the label.
    #[arg(long)]
    show_text: bool,

    /// Output structured JSON instead of text.
    #[arg(long, env = "LABEL_EXPLAIN_JSON")]
    json: bool,

    /// Number of images processed at once.
    #[arg(short, long, env = "LABEL_EXPLAIN_CONCURRENCY", default_value_t = 2,
          value_parser = clap::value_parser!(u16).range(1..=32))]
    concurrency: u16,

    /// Disable the progress spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LABEL_EXPLAIN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, env = "LABEL_EXPLAIN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LanguageArg {
    English,
    Tamil,
}

impl From<LanguageArg> for Language {
    fn from(v: LanguageArg) -> Self {
        match v {
            LanguageArg::English => Language::English,
            LanguageArg::Tamil => Language::Tamil,
        }
    }
}

/// One image's result as printed by `--json`.
#[derive(Serialize)]
struct Report {
    image: PathBuf,
    #[serde(flatten)]
    output: ExplainOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<AudioArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs off
    // while it is running.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress = show_progress.then(|| CliProgressCallback::new(cli.images.len()));
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;
    let explainer = Explainer::new(config).context("Failed to set up the pipeline")?;
    let language: Language = cli.language.into();

    // ── Run ──────────────────────────────────────────────────────────────
    let mut reports: Vec<(usize, Report)> = stream::iter(cli.images.iter().cloned().enumerate())
        .map(|(idx, image)| {
            let explainer = explainer.clone();
            let speak = cli.speak;
            async move {
                let output = explainer.explain_path(&image, language).await;
                let (audio, audio_error) = match output.outcome.explanation() {
                    Some(explanation) if speak => match explainer.read_aloud(explanation).await {
                        Ok(a) => (Some(a), None),
                        Err(e) => (None, Some(e.to_string())),
                    },
                    _ => (None, None),
                };
                (
                    idx,
                    Report {
                        image,
                        output,
                        audio,
                        audio_error,
                    },
                )
            }
        })
        .buffer_unordered(usize::from(cli.concurrency))
        .collect()
        .await;
    reports.sort_by_key(|(idx, _)| *idx);
    let reports: Vec<Report> = reports.into_iter().map(|(_, r)| r).collect();

    if let Some(ref p) = progress {
        p.bar.finish_and_clear();
    }

    // ── Print ────────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for report in &reports {
            print_report(&mut handle, report, &cli).context("Failed to write to stdout")?;
        }
        handle.flush().ok();
        if !cli.quiet {
            eprintln!("{}", dim(DISCLAIMER));
        }
    }

    let failed = reports.iter().filter(|r| !r.output.outcome.is_success()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} image(s) could not be explained", reports.len());
    }
    Ok(())
}

fn print_report(out: &mut impl Write, report: &Report, cli: &Cli) -> io::Result<()> {
    if cli.images.len() > 1 {
        writeln!(out, "{}", bold(&format!("── {} ──", report.image.display())))?;
    }

    if cli.show_text && !report.output.extracted_text.is_empty() {
        writeln!(out, "{}", cyan("Text found on the label:"))?;
        for line in report.output.extracted_text.lines() {
            writeln!(out, "  {}", dim(line))?;
        }
        writeln!(out)?;
    }

    match &report.output.outcome {
        PipelineOutcome::Explained { explanation } => {
            write!(out, "{explanation}")?;
            if !report.output.unverified_dosages.is_empty() {
                writeln!(
                    out,
                    "\n{} check these against the label: {}",
                    cyan("⚠"),
                    report.output.unverified_dosages.join(", ")
                )?;
            }
        }
        other => writeln!(out, "{} {}", red("✗"), other.user_message())?,
    }

    if let Some(ref audio) = report.audio {
        writeln!(out, "\n{} Audio: {}", green("♪"), audio.path.display())?;
    } else if report.audio_error.is_some() {
        writeln!(out, "\n{} Could not generate audio.", red("✗"))?;
    }

    if cli.images.len() > 1 {
        writeln!(out)?;
    }
    Ok(())
}

/// Map CLI args to `ExplainConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExplainConfig> {
    let base_url = cli
        .endpoint
        .clone()
        .or_else(|| std::env::var("OLLAMA_HOST").ok().filter(|h| !h.trim().is_empty()))
        .map(|h| normalise_host(&h))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let mut builder = ExplainConfig::builder()
        .base_url(base_url)
        .model(&cli.model)
        .request_timeout_secs(cli.timeout)
        .ocr_language(&cli.ocr_language);

    if let Some(ref dir) = cli.audio_dir {
        builder = builder.audio_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `OLLAMA_HOST` is often a bare `host:port`.
fn normalise_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
