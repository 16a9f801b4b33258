//! Error types for the label-explain library.
//!
//! Each pipeline stage owns its own error type so callers can tell exactly
//! which external service let them down:
//!
//! * [`ExtractionError`] — the image could not be decoded or the OCR engine
//!   failed. An image with no legible text is *not* an error; it yields an
//!   empty [`crate::output::ExtractedText`].
//!
//! * [`GenerationError`] — the text-generation backend could not produce an
//!   explanation. [`GenerationError::kind`] collapses the variants into the
//!   four outcomes a presentation layer needs to distinguish.
//!
//! * [`SynthesisError`] — the speech engine failed. Users only ever see a
//!   generic "could not generate audio" message; the detail goes to logs.
//!
//! * [`ExplainError`] — fatal library problems that are not a stage outcome
//!   (bad configuration, runtime creation, writing output files).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The image could not be turned into text.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The bytes or file were not a decodable raster image.
    #[error("Could not decode image: {0}")]
    Decode(String),

    /// The OCR engine is not installed or could not be initialised.
    #[error("OCR engine unavailable: {0}\nInstall Tesseract (e.g. `apt install tesseract-ocr`) and make sure it is on PATH.")]
    EngineUnavailable(String),

    /// The OCR engine ran but failed on this image.
    #[error("Error during OCR processing: {0}")]
    EngineFailed(String),
}

/// Coarse classification of a [`GenerationError`].
///
/// These are the four outcomes a caller must be able to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    EmptyInput,
    ServiceUnavailable,
    EmptyResponse,
    Other,
}

/// The explanation could not be generated.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Called with empty extracted text. No request was sent.
    #[error("No text provided to simplify.")]
    EmptyInput,

    /// Connection-level failure: nothing is listening at the endpoint.
    #[error("Could not connect to the local AI service at '{endpoint}'.\nPlease make sure Ollama is running (run 'ollama serve' in a terminal).")]
    ServiceUnavailable { endpoint: String },

    /// The backend answered but the `response` field was missing or blank.
    #[error("Empty response from the AI service.")]
    EmptyResponse,

    /// The request did not complete within the configured timeout.
    #[error("The AI service did not answer within {secs}s.\nIncrease --timeout or use a smaller model.")]
    Timeout { secs: u64 },

    /// The backend answered with a non-2xx status.
    #[error("The AI service returned HTTP {status}: {body}")]
    BackendStatus { status: u16, body: String },

    /// Any other transport or decoding failure.
    #[error("Error during simplification: {0}")]
    Other(String),
}

impl GenerationError {
    /// Collapse this error into one of the four caller-facing kinds.
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            GenerationError::EmptyInput => GenerationErrorKind::EmptyInput,
            GenerationError::ServiceUnavailable { .. } => GenerationErrorKind::ServiceUnavailable,
            GenerationError::EmptyResponse => GenerationErrorKind::EmptyResponse,
            GenerationError::Timeout { .. }
            | GenerationError::BackendStatus { .. }
            | GenerationError::Other(_) => GenerationErrorKind::Other,
        }
    }
}

/// The speech engine could not produce audio.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Text to speak was empty after emphasis stripping.
    #[error("Nothing to read aloud")]
    EmptyText,

    /// The engine executable is missing or refused to start.
    #[error("Speech engine unavailable: {0}\nInstall espeak-ng (e.g. `apt install espeak-ng`).")]
    EngineUnavailable(String),

    /// The engine started but failed to render audio.
    #[error("Speech rendering failed: {0}")]
    RenderFailed(String),

    /// Creating the audio file failed.
    #[error("Failed to prepare audio file in '{dir}': {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal errors that are not a pipeline stage outcome.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
