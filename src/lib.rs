//! # label-explain
//!
//! Turn a photo of a medicine label into a short, plain-language explanation,
//! optionally read aloud.
//!
//! ## Why this crate?
//!
//! Prescription labels are dense: abbreviations, tiny print, dosage
//! instructions mixed with storage notes. People with low literacy or poor
//! eyesight, or who read another language, often cannot use them at all.
//! This crate reads the label with OCR and asks a *local* language model to
//! rephrase it under strict safety rules (never change a number, never add
//! advice), then hands back four fixed sections the caller can show or speak.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Extract   OCR the whole image, drop noise lines (spawn_blocking)
//!  ├─ 2. Generate  one Ollama /api/generate call with the safety prompt
//!  ├─ 3. Polish    deterministic cleanup, dosage cross-check
//!  └─ 4. Speech    [optional] espeak-ng render to a fresh WAV file
//! ```
//!
//! An image with no legible text stops after step 1 and never reaches the
//! model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use label_explain::{ExplainConfig, Explainer, Language};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Expects `ollama serve` on localhost:11434 with `mistral` pulled
//!     let explainer = Explainer::new(ExplainConfig::default())?;
//!     let output = explainer.explain_path("label.jpg", Language::English).await;
//!     println!("{}", output.outcome.user_message());
//!
//!     if let Some(explanation) = output.outcome.explanation() {
//!         let audio = explainer.read_aloud(explanation).await?;
//!         eprintln!("audio: {}", audio.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `label-explain` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `leptess` | off     | In-process Tesseract via `leptess` instead of the `tesseract` executable |
//!
//! ## External Programs
//!
//! | Stage    | Needs |
//! |----------|-------|
//! | Extract  | `tesseract` on `PATH` (or the `leptess` feature) |
//! | Generate | an Ollama-compatible server |
//! | Speech   | `espeak-ng` on `PATH` |
//!
//! Each engine sits behind a trait ([`TextRecognizer`], [`SpeechEngine`]) so
//! tests and embedders can substitute their own.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod explain;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExplainConfig, ExplainConfigBuilder, Language, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{
    ExplainError, ExtractionError, GenerationError, GenerationErrorKind, SynthesisError,
};
pub use explain::Explainer;
pub use output::{
    AudioArtifact, AudioFormat, ExplainOutput, Explanation, ExtractedText, PipelineOutcome,
    PipelineStats, Section,
};
pub use pipeline::extract::{TesseractCli, TextRecognizer};
#[cfg(feature = "leptess")]
pub use pipeline::extract::LeptessRecognizer;
pub use pipeline::generate::OllamaClient;
pub use pipeline::speech::{EspeakEngine, SpeechEngine, SpeechSession};
pub use progress::{NoopProgressCallback, PipelineStage, ProgressCallback, StageProgressCallback};
