//! Output types: what each stage produces and what the pipeline returns.

use crate::config::Language;
use crate::error::{GenerationError, GenerationErrorKind};
use crate::pipeline::{extract, postprocess};
use crate::prompts::UNREADABLE_FALLBACK;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Cleaned OCR output: trimmed lines longer than two characters, joined by `\n`.
///
/// Empty means "no text found", which is a valid result and not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Clean raw recognizer output into label text.
    pub fn from_ocr(raw: &str) -> Self {
        Self(extract::clean_ocr_text(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.lines()
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four mandatory sections of an explanation, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    MedicineName,
    WhatItIsFor,
    HowToTake,
    ImportantNote,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::MedicineName,
        Section::WhatItIsFor,
        Section::HowToTake,
        Section::ImportantNote,
    ];

    /// Emoji that marks the section heading in every language.
    pub fn marker(&self) -> &'static str {
        match self {
            Section::MedicineName => "💊",
            Section::WhatItIsFor => "🩺",
            Section::HowToTake => "🕒",
            // Models drop the U+FE0F variation selector about half the time.
            Section::ImportantNote => "⚠",
        }
    }

    /// English heading label.
    pub fn title(&self) -> &'static str {
        match self {
            Section::MedicineName => "Medicine Name",
            Section::WhatItIsFor => "What it is for",
            Section::HowToTake => "How to take",
            Section::ImportantNote => "Important note",
        }
    }

    fn from_heading(line: &str) -> Option<Section> {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            return None;
        }
        Section::ALL.into_iter().find(|s| trimmed.contains(s.marker()))
    }
}

/// A plain-language explanation of a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    text: String,
    language: Language,
}

impl Explanation {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Section headings in the order they appear.
    pub fn sections(&self) -> Vec<Section> {
        self.text.lines().filter_map(Section::from_heading).collect()
    }

    /// All four sections present, each once, in the fixed order.
    pub fn has_all_sections(&self) -> bool {
        self.sections() == Section::ALL
    }

    /// Body text under `section`, without its heading line.
    pub fn section_body(&self, section: Section) -> Option<String> {
        let mut body: Option<Vec<&str>> = None;
        for line in self.text.lines() {
            match Section::from_heading(line) {
                Some(s) if s == section => body = Some(Vec::new()),
                Some(_) if body.is_some() => break,
                _ => {
                    if let Some(ref mut b) = body {
                        b.push(line);
                    }
                }
            }
        }
        body.map(|b| b.join("\n").trim().to_string())
    }

    /// The model answered with the unreadable-label fallback.
    pub fn is_unreadable(&self) -> bool {
        self.text.contains(UNREADABLE_FALLBACK)
    }

    /// Dosage tokens found in `source` that do not appear verbatim here.
    ///
    /// A Tamil explanation translates phrases such as `every 8 hours`, so only
    /// measured amounts (`500mg`, `5 ml`) are checked for it.
    pub fn missing_dosages(&self, source: &ExtractedText) -> Vec<String> {
        let haystack = self.text.to_lowercase();
        postprocess::dosage_tokens(source.as_str())
            .into_iter()
            .filter(|t| self.language != Language::Tamil || postprocess::is_measured_amount(t))
            .filter(|t| !haystack.contains(&t.to_lowercase()))
            .collect()
    }

    /// Plain prose for the speech engine: emphasis markers removed.
    pub fn speech_text(&self) -> String {
        postprocess::strip_emphasis(&self.text)
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Container format of a rendered audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// A rendered recording of an explanation.
///
/// Each synthesis writes a new file with a unique name; nothing is reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
}

impl AudioArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the encoded audio bytes.
    pub async fn bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// What the pipeline hands back to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The label was explained.
    Explained { explanation: Explanation },
    /// OCR found no legible text.
    NoTextFound,
    /// The image could not be processed.
    ExtractionFailed { message: String },
    /// The generator failed; generation was the last stage attempted.
    GenerationFailed {
        #[serde(serialize_with = "serialize_generation_error")]
        error: GenerationError,
    },
}

fn serialize_generation_error<S: Serializer>(
    e: &GenerationError,
    s: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;
    let mut st = s.serialize_struct("GenerationError", 2)?;
    st.serialize_field("kind", &e.kind())?;
    st.serialize_field("message", &e.to_string())?;
    st.end()
}

impl PipelineOutcome {
    pub fn explanation(&self) -> Option<&Explanation> {
        match self {
            PipelineOutcome::Explained { explanation } => Some(explanation),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Explained { .. })
    }

    /// Kind of generation failure, if that is how the run ended.
    pub fn generation_error_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            PipelineOutcome::GenerationFailed { error } => Some(error.kind()),
            _ => None,
        }
    }

    /// Message suitable for showing to the person holding the medicine.
    pub fn user_message(&self) -> String {
        match self {
            PipelineOutcome::Explained { explanation } => explanation.to_string(),
            PipelineOutcome::NoTextFound => {
                "Could not find any text in the image. Please try a clearer photo.".to_string()
            }
            PipelineOutcome::ExtractionFailed { message } => {
                format!("Could not process the image. {message}")
            }
            PipelineOutcome::GenerationFailed { error } => error.to_string(),
        }
    }
}

/// Per-stage timings of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub extract_duration_ms: u64,
    pub generate_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of one pipeline run, including intermediate text for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainOutput {
    pub outcome: PipelineOutcome,
    /// Cleaned OCR text; empty when nothing was read or extraction failed.
    pub extracted_text: ExtractedText,
    /// Dosage tokens from the label that the explanation did not repeat.
    pub unverified_dosages: Vec<String>,
    pub stats: PipelineStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "## 💊 Medicine Name\nAmoxicillin\n\n\
## 🩺 What it is for\nAn antibiotic for infections.\n\n\
## 🕒 How to take\nTake 1 tablet (500mg) every 8 hours for 7 days.\n\n\
## ⚠️ Important note\nIt may make you feel sleepy (drowsiness).\n";

    #[test]
    fn extracted_text_cleans_noise() {
        let t = ExtractedText::from_ocr("  Rx: Amoxicillin  \n\n|\nab\nTake daily\n");
        assert_eq!(t.as_str(), "Rx: Amoxicillin\nTake daily");
        assert!(ExtractedText::from_ocr("\n \n").is_empty());
    }

    #[test]
    fn sections_in_order() {
        let e = Explanation::new(GOOD, Language::English);
        assert_eq!(e.sections(), Section::ALL.to_vec());
        assert!(e.has_all_sections());
    }

    #[test]
    fn sections_out_of_order_rejected() {
        let text = "## 🩺 What it is for\nx\n## 💊 Medicine Name\ny\n## 🕒 How to take\nz\n## ⚠️ Important note\nw";
        assert!(!Explanation::new(text, Language::English).has_all_sections());
    }

    #[test]
    fn tamil_headings_detected_by_marker() {
        let text = "## 💊 மருந்தின் பெயர்\nஅமோக்ஸிசிலின்\n## 🩺 எதற்காக\nதொற்று\n\
## 🕒 எப்படி எடுப்பது\n500mg\n## ⚠ முக்கிய குறிப்பு\nதூக்கம்";
        let e = Explanation::new(text, Language::Tamil);
        assert!(e.has_all_sections());
        assert_eq!(e.language(), Language::Tamil);
    }

    #[test]
    fn section_body_extraction() {
        let e = Explanation::new(GOOD, Language::English);
        let note = e.section_body(Section::ImportantNote).unwrap();
        assert!(note.contains("drowsiness"));
        let how = e.section_body(Section::HowToTake).unwrap();
        assert!(how.starts_with("Take 1 tablet"));
        assert!(!how.contains("Important"));
    }

    #[test]
    fn missing_dosages_reports_altered_figures() {
        let src = ExtractedText::from_ocr("Take 500mg every 8 hours for 7 days");
        let kept = Explanation::new(GOOD, Language::English);
        assert!(kept.missing_dosages(&src).is_empty());

        let altered = Explanation::new("Take 250mg twice a day", Language::English);
        let missing = altered.missing_dosages(&src);
        assert!(missing.contains(&"500mg".to_string()));
        assert!(missing.contains(&"every 8 hours".to_string()));
    }

    #[test]
    fn tamil_checks_only_measured_amounts() {
        let src = ExtractedText::from_ocr("Take 500mg every 8 hours for 7 days");
        let translated = Explanation::new(
            "## 🕒 எப்படி சாப்பிடுவது\n500mg, 8 மணி நேரத்திற்கு ஒருமுறை, 7 நாட்கள்.",
            Language::Tamil,
        );
        assert!(translated.missing_dosages(&src).is_empty());

        let altered = Explanation::new("250mg, 8 மணி நேரத்திற்கு ஒருமுறை", Language::Tamil);
        assert_eq!(altered.missing_dosages(&src), vec!["500mg".to_string()]);
    }

    #[test]
    fn unreadable_fallback_detected() {
        let e = Explanation::new("Could not read the label clearly.", Language::English);
        assert!(e.is_unreadable());
        assert!(!Explanation::new(GOOD, Language::English).is_unreadable());
    }

    #[test]
    fn outcome_messages_are_distinct() {
        let msgs = [
            PipelineOutcome::NoTextFound.user_message(),
            PipelineOutcome::ExtractionFailed { message: "bad".into() }.user_message(),
            PipelineOutcome::GenerationFailed { error: GenerationError::EmptyResponse }
                .user_message(),
            PipelineOutcome::GenerationFailed {
                error: GenerationError::ServiceUnavailable { endpoint: "e".into() },
            }
            .user_message(),
        ];
        for (i, a) in msgs.iter().enumerate() {
            for b in msgs.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn outcome_serialises_with_kind() {
        let o = PipelineOutcome::GenerationFailed {
            error: GenerationError::ServiceUnavailable { endpoint: "e".into() },
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["outcome"], "generation_failed");
        assert_eq!(v["error"]["kind"], "service_unavailable");
    }

    #[test]
    fn audio_format_tags() {
        assert_eq!(AudioFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioFormat::Mp3.extension(), "mp3");
    }
}
