//! Pipeline orchestration: one image in, one outcome out.
//!
//! [`Explainer`] runs the stages strictly in sequence and stops at the first
//! one that does not produce input for the next. Every call starts from
//! [`PipelineStage::Idle`]; nothing is remembered between calls, so one
//! `Explainer` can serve any number of concurrent requests.
//!
//! Speech is not part of [`Explainer::explain`]. Callers who want audio pass
//! the resulting [`Explanation`] to [`Explainer::read_aloud`].

use crate::config::{ExplainConfig, Language};
use crate::error::{ExplainError, ExtractionError, GenerationError, SynthesisError};
use crate::output::{
    AudioArtifact, ExplainOutput, Explanation, ExtractedText, PipelineOutcome, PipelineStats,
};
use crate::pipeline::extract::{self, TesseractCli, TextRecognizer};
use crate::pipeline::generate::{self, OllamaClient};
use crate::pipeline::speech::{self, EspeakEngine, SpeechEngine, SpeechOptions};
use crate::progress::PipelineStage;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The label explanation pipeline.
///
/// # Example
/// ```rust,no_run
/// use label_explain::{ExplainConfig, Explainer, Language};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let explainer = Explainer::new(ExplainConfig::default())?;
/// let output = explainer.explain_path("label.jpg", Language::English).await;
/// println!("{}", output.outcome.user_message());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Explainer {
    config: ExplainConfig,
    client: OllamaClient,
    recognizer: Arc<dyn TextRecognizer>,
    speech: Arc<dyn SpeechEngine>,
}

impl Explainer {
    /// Build a pipeline with the default engines: the `tesseract` executable
    /// for OCR and `espeak-ng` for speech.
    pub fn new(config: ExplainConfig) -> Result<Self, ExplainError> {
        let client = OllamaClient::new(&config).map_err(|e| ExplainError::Internal(e.to_string()))?;
        let recognizer = Arc::new(TesseractCli::new(config.ocr_language.clone()));
        Ok(Self {
            config,
            client,
            recognizer,
            speech: Arc::new(EspeakEngine::new()),
        })
    }

    /// Replace the OCR engine.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Replace the speech engine.
    pub fn with_speech_engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.speech = engine;
        self
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// OCR `image` into cleaned label text. Empty text is not an error.
    pub async fn extract_text(
        &self,
        image: &DynamicImage,
    ) -> Result<ExtractedText, ExtractionError> {
        extract::extract(image, Arc::clone(&self.recognizer)).await
    }

    /// Explain already-extracted label text.
    pub async fn simplify(
        &self,
        text: &ExtractedText,
        language: Language,
    ) -> Result<Explanation, GenerationError> {
        generate::simplify(&self.client, text, language).await
    }

    /// Render `explanation` to an audio file.
    ///
    /// The voice follows the explanation's language unless the config
    /// overrides it. Failures are logged here; callers only need a generic
    /// "could not generate audio" message.
    pub async fn read_aloud(
        &self,
        explanation: &Explanation,
    ) -> Result<AudioArtifact, SynthesisError> {
        let options = SpeechOptions {
            voice: self
                .config
                .voice
                .clone()
                .unwrap_or_else(|| explanation.language().voice().to_string()),
            rate_offset: self.config.speech_rate_offset,
            out_dir: self.config.audio_dir.clone(),
        };

        self.notify_start(PipelineStage::Synthesizing);
        let start = Instant::now();
        let speech_text = explanation.speech_text();
        let result = speech::synthesize(Arc::clone(&self.speech), &speech_text, &options).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(audio) => {
                debug!(path = %audio.path.display(), elapsed_ms, "Speech rendered");
                self.notify_complete(PipelineStage::AudioReady, elapsed_ms);
            }
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed");
                self.notify_complete(PipelineStage::SynthFailed, elapsed_ms);
            }
        }
        result
    }

    /// Run OCR and explanation over one image.
    ///
    /// Never fails as a whole: every way a run can end is a
    /// [`PipelineOutcome`]. An image with no legible text ends in
    /// [`PipelineOutcome::NoTextFound`] and never reaches the backend.
    pub async fn explain(&self, image: &DynamicImage, language: Language) -> ExplainOutput {
        let total_start = Instant::now();
        let mut stats = PipelineStats::default();
        debug!(%language, width = image.width(), height = image.height(), "Starting explanation");

        // ── Step 1: OCR ──────────────────────────────────────────────────
        self.notify_start(PipelineStage::Extracting);
        let extract_start = Instant::now();
        let extracted = self.extract_text(image).await;
        stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;

        let text = match extracted {
            Ok(t) if t.is_empty() => {
                info!("No text found in image");
                self.notify_complete(PipelineStage::NoText, stats.extract_duration_ms);
                return finish(
                    PipelineOutcome::NoTextFound,
                    ExtractedText::default(),
                    stats,
                    total_start,
                );
            }
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Text extraction failed");
                self.notify_complete(PipelineStage::ExtractFailed, stats.extract_duration_ms);
                let outcome = PipelineOutcome::ExtractionFailed {
                    message: e.to_string(),
                };
                return finish(outcome, ExtractedText::default(), stats, total_start);
            }
        };

        // ── Step 2: Generate ─────────────────────────────────────────────
        self.notify_start(PipelineStage::Simplifying);
        let generate_start = Instant::now();
        let generated = self.simplify(&text, language).await;
        stats.generate_duration_ms = generate_start.elapsed().as_millis() as u64;

        match generated {
            Ok(explanation) => {
                self.notify_complete(PipelineStage::Explained, stats.generate_duration_ms);

                // ── Step 3: Verify dosages ───────────────────────────────
                let missing = explanation.missing_dosages(&text);
                for token in &missing {
                    warn!(token = %token, "Dosage from the label is missing in the explanation");
                }
                if !explanation.has_all_sections() && !explanation.is_unreadable() {
                    warn!(
                        found = ?explanation.sections(),
                        "Explanation is missing section headers"
                    );
                }

                let mut output = finish(
                    PipelineOutcome::Explained { explanation },
                    text,
                    stats,
                    total_start,
                );
                output.unverified_dosages = missing;
                output
            }
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "Explanation failed");
                self.notify_complete(PipelineStage::GenFailed, stats.generate_duration_ms);
                finish(
                    PipelineOutcome::GenerationFailed { error: e },
                    text,
                    stats,
                    total_start,
                )
            }
        }
    }

    /// [`explain`](Self::explain) an encoded image (PNG or JPEG).
    ///
    /// Bytes that do not decode end in [`PipelineOutcome::ExtractionFailed`].
    pub async fn explain_bytes(&self, bytes: &[u8], language: Language) -> ExplainOutput {
        match extract::decode_image(bytes) {
            Ok(image) => self.explain(&image, language).await,
            Err(e) => {
                warn!(error = %e, "Image could not be decoded");
                self.notify_start(PipelineStage::Extracting);
                self.notify_complete(PipelineStage::ExtractFailed, 0);
                extraction_failed(e)
            }
        }
    }

    /// [`explain`](Self::explain) an image file.
    ///
    /// An unreadable file is reported like an undecodable image.
    pub async fn explain_path(&self, path: impl AsRef<Path>, language: Language) -> ExplainOutput {
        let path = path.as_ref();
        info!(path = %path.display(), "Explaining label image");
        match tokio::fs::read(path).await {
            Ok(bytes) => self.explain_bytes(&bytes, language).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Image file could not be read");
                self.notify_start(PipelineStage::Extracting);
                self.notify_complete(PipelineStage::ExtractFailed, 0);
                extraction_failed(ExtractionError::Decode(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        }
    }

    /// [`explain_path`](Self::explain_path) and write the explanation to
    /// `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    /// Nothing is written unless the run ends in
    /// [`PipelineOutcome::Explained`].
    pub async fn explain_to_file(
        &self,
        image_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        language: Language,
    ) -> Result<ExplainOutput, ExplainError> {
        let output = self.explain_path(image_path, language).await;
        let Some(explanation) = output.outcome.explanation() else {
            return Ok(output);
        };
        let path = output_path.as_ref();
        let write_err = |source| ExplainError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, explanation.as_str())
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!(path = %path.display(), "Explanation written");
        Ok(output)
    }

    /// Synchronous wrapper around [`explain`](Self::explain).
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn explain_sync(
        &self,
        image: &DynamicImage,
        language: Language,
    ) -> Result<ExplainOutput, ExplainError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ExplainError::Internal(format!("Failed to create tokio runtime: {e}")))?;
        Ok(runtime.block_on(self.explain(image, language)))
    }

    fn notify_start(&self, stage: PipelineStage) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn notify_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
    }
}

fn finish(
    outcome: PipelineOutcome,
    extracted_text: ExtractedText,
    mut stats: PipelineStats,
    total_start: Instant,
) -> ExplainOutput {
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    ExplainOutput {
        outcome,
        extracted_text,
        unverified_dosages: Vec::new(),
        stats,
    }
}

fn extraction_failed(e: ExtractionError) -> ExplainOutput {
    ExplainOutput {
        outcome: PipelineOutcome::ExtractionFailed {
            message: e.to_string(),
        },
        extracted_text: ExtractedText::default(),
        unverified_dosages: Vec::new(),
        stats: PipelineStats::default(),
    }
}
