//! Configuration types for label explanation.
//!
//! Every knob lives in [`ExplainConfig`], built via its
//! [`ExplainConfigBuilder`]. The config is immutable once built and cheap to
//! clone, so one value can be shared by any number of concurrent requests.

use crate::error::ExplainError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default generation model.
pub const DEFAULT_MODEL: &str = "mistral";

/// Configuration for the explanation pipeline.
///
/// # Example
/// ```rust
/// use label_explain::ExplainConfig;
///
/// let config = ExplainConfig::builder()
///     .model("llama3.2")
///     .request_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "llama3.2");
/// ```
#[derive(Clone)]
pub struct ExplainConfig {
    /// Base URL of the Ollama-compatible backend. Default: `http://localhost:11434`.
    pub base_url: String,

    /// Generation model name. Default: `mistral`.
    pub model: String,

    /// Upper bound on a single generation request, in seconds. Default: 120.
    ///
    /// Local models on a laptop CPU can take a minute for a label; an
    /// unreachable or wedged backend must not hang the caller forever.
    pub request_timeout_secs: u64,

    /// Tesseract language pack used for OCR. Default: `eng`.
    pub ocr_language: String,

    /// How many words per minute below the engine default to speak. Default: 50.
    pub speech_rate_offset: u32,

    /// Speech voice override. If None, chosen from the explanation language.
    pub voice: Option<String>,

    /// Directory receiving audio artifacts. Default: the system temp dir.
    pub audio_dir: PathBuf,

    /// Stage progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            ocr_language: "eng".to_string(),
            speech_rate_offset: 50,
            voice: None,
            audio_dir: std::env::temp_dir(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExplainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplainConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("ocr_language", &self.ocr_language)
            .field("speech_rate_offset", &self.speech_rate_offset)
            .field("voice", &self.voice)
            .field("audio_dir", &self.audio_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl ExplainConfig {
    /// Create a new builder for `ExplainConfig`.
    pub fn builder() -> ExplainConfigBuilder {
        ExplainConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of the generate endpoint.
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

/// Builder for [`ExplainConfig`].
#[derive(Debug)]
pub struct ExplainConfigBuilder {
    config: ExplainConfig,
}

impl ExplainConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn speech_rate_offset(mut self, wpm: u32) -> Self {
        self.config.speech_rate_offset = wpm;
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = Some(voice.into());
        self
    }

    pub fn audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.audio_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExplainConfig, ExplainError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExplainError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ExplainError::InvalidConfig("model name must not be empty".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(ExplainError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ExplainError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output language of the explanation.
///
/// Selects both the prompt directive and the speech voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Tamil,
}

impl Language {
    /// espeak-ng voice for this language.
    pub fn voice(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Tamil => "ta",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => f.write_str("English"),
            Language::Tamil => f.write_str("Tamil"),
        }
    }
}

impl FromStr for Language {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "tamil" | "ta" => Ok(Language::Tamil),
            other => Err(ExplainError::InvalidConfig(format!(
                "unsupported language '{other}' (expected english or tamil)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExplainConfig::default();
        assert_eq!(c.model, "mistral");
        assert_eq!(c.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(c.speech_rate_offset, 50);
        assert_eq!(c.ocr_language, "eng");
    }

    #[test]
    fn generate_url_trims_trailing_slash() {
        let c = ExplainConfig::builder()
            .base_url("http://10.0.0.2:11434/")
            .build()
            .unwrap();
        assert_eq!(c.generate_url(), "http://10.0.0.2:11434/api/generate");
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ExplainConfig::builder().request_timeout_secs(0).build();
        assert!(matches!(err, Err(ExplainError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_non_http_url() {
        let err = ExplainConfig::builder().base_url("localhost:11434").build();
        assert!(matches!(err, Err(ExplainError::InvalidConfig(_))));
    }

    #[test]
    fn language_parsing() {
        assert_eq!("English".parse::<Language>().unwrap(), Language::English);
        assert_eq!("TA".parse::<Language>().unwrap(), Language::Tamil);
        assert_eq!(" tamil ".parse::<Language>().unwrap(), Language::Tamil);
        assert!("french".parse::<Language>().is_err());
    }

    #[test]
    fn language_voice() {
        assert_eq!(Language::English.voice(), "en");
        assert_eq!(Language::Tamil.voice(), "ta");
    }
}
