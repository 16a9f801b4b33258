//! Text extraction: `DynamicImage` → cleaned label text.
//!
//! OCR always runs over the whole image with a single language pack. The raw
//! output is full of one- and two-character fragments (barcode bars read as
//! `|`, blister-pack edges read as `—`), so lines whose trimmed length is two
//! characters or fewer are dropped before anything downstream sees them.
//!
//! Two recognizers are provided:
//!
//! * [`TesseractCli`] — shells out to the `tesseract` executable. No native
//!   linking at build time; the default.
//! * `LeptessRecognizer` — in-process Tesseract via `leptess`, behind the
//!   `leptess` cargo feature.

use crate::error::ExtractionError;
use crate::output::ExtractedText;
use image::DynamicImage;
use std::io::{Cursor, Write};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Lines this short or shorter (after trimming) are treated as OCR noise.
pub const MIN_LINE_CHARS: usize = 2;

/// An OCR engine.
///
/// Implementations are called from a blocking thread and must not keep
/// per-image state between calls.
pub trait TextRecognizer: Send + Sync {
    /// Recognize all text in `image`, one output line per detected line.
    ///
    /// Return `Ok(String::new())` when the image holds no legible text.
    fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractionError>;
}

/// Trim every line, drop lines of [`MIN_LINE_CHARS`] characters or fewer,
/// and rejoin with `\n`.
pub fn clean_ocr_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_LINE_CHARS)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run `recognizer` over `image` and clean the result.
///
/// Runs inside `spawn_blocking`; OCR is CPU-bound and the engines are
/// synchronous. The caller's image is cloned into the task and never mutated.
pub async fn extract(
    image: &DynamicImage,
    recognizer: Arc<dyn TextRecognizer>,
) -> Result<ExtractedText, ExtractionError> {
    let img = image.clone();
    let raw = tokio::task::spawn_blocking(move || recognizer.recognize(&img))
        .await
        .map_err(|e| ExtractionError::EngineFailed(format!("OCR task panicked: {e}")))??;

    let text = ExtractedText::from_ocr(&raw);
    info!(
        raw_lines = raw.lines().count(),
        kept_lines = text.lines().count(),
        "OCR finished"
    );
    Ok(text)
}

/// Decode an encoded image (PNG, JPEG) into a bitmap.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    image::load_from_memory(bytes).map_err(|e| ExtractionError::Decode(e.to_string()))
}

// ── Tesseract CLI ────────────────────────────────────────────────────────────

/// Recognizer driving the `tesseract` executable.
///
/// Each call PNG-encodes the image into its own temp file, so concurrent
/// calls never share a path.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    language: String,
}

impl TesseractCli {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            program: "tesseract".to_string(),
            language: language.into(),
        }
    }

    /// Use a specific executable instead of `tesseract` from PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| ExtractionError::EngineFailed(format!("PNG encoding failed: {e}")))?;

        let mut tmp = tempfile::Builder::new()
            .prefix("label-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ExtractionError::EngineFailed(format!("tempfile: {e}")))?;
        tmp.write_all(&png)
            .and_then(|_| tmp.flush())
            .map_err(|e| ExtractionError::EngineFailed(format!("tempfile write: {e}")))?;

        debug!(program = %self.program, lang = %self.language, "Running tesseract");
        let output = Command::new(&self.program)
            .arg(tmp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::EngineUnavailable(format!("'{}' not found", self.program))
                } else {
                    ExtractionError::EngineFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::EngineFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── leptess ──────────────────────────────────────────────────────────────────

#[cfg(feature = "leptess")]
pub use self::in_process::LeptessRecognizer;

#[cfg(feature = "leptess")]
mod in_process {
    use super::*;
    use leptess::LepTess;

    /// In-process Tesseract. A fresh engine is created for every image so
    /// that concurrent requests never contend for one handle.
    #[derive(Debug, Clone)]
    pub struct LeptessRecognizer {
        language: String,
    }

    impl LeptessRecognizer {
        pub fn new(language: impl Into<String>) -> Self {
            Self {
                language: language.into(),
            }
        }
    }

    impl TextRecognizer for LeptessRecognizer {
        fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
            let mut png = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| ExtractionError::EngineFailed(format!("PNG encoding failed: {e}")))?;

            let mut lt = LepTess::new(None, &self.language)
                .map_err(|e| ExtractionError::EngineUnavailable(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| ExtractionError::EngineFailed(format!("Failed to set image: {e}")))?;
            lt.get_utf8_text()
                .map_err(|e| ExtractionError::EngineFailed(format!("Failed to extract text: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct Fixed(&'static str);

    impl TextRecognizer for Fixed {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl TextRecognizer for Broken {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, ExtractionError> {
            Err(ExtractionError::EngineFailed("segfault in leptonica".into()))
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn clean_drops_short_and_blank_lines() {
        let raw = "  Paracetamol 500mg  \n\n  \n|\n--\nok\nabc\n\tKeep dry\t\n";
        let cleaned = clean_ocr_text(raw);
        assert_eq!(cleaned, "Paracetamol 500mg\nabc\nKeep dry");
        assert!(cleaned.lines().all(|l| l.trim().chars().count() > MIN_LINE_CHARS));
    }

    #[test]
    fn clean_counts_characters_not_bytes() {
        // Two Tamil code points are six bytes but still noise.
        assert_eq!(clean_ocr_text("மா\nமாத்திரை"), "மாத்திரை");
    }

    #[test]
    fn clean_empty_is_empty() {
        assert_eq!(clean_ocr_text(""), "");
        assert_eq!(clean_ocr_text("\n\n a \n"), "");
    }

    #[tokio::test]
    async fn extract_no_text_is_empty_not_error() {
        let out = extract(&blank(), Arc::new(Fixed("\n \n"))).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn extract_keeps_line_order() {
        let out = extract(&blank(), Arc::new(Fixed("Rx: Amoxicillin 500mg\nx\nTake 1 tablet")))
            .await
            .unwrap();
        assert_eq!(out.as_str(), "Rx: Amoxicillin 500mg\nTake 1 tablet");
    }

    #[tokio::test]
    async fn extract_failure_is_error() {
        let err = extract(&blank(), Arc::new(Broken)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EngineFailed(_)));
    }

    #[test]
    fn decode_garbage_fails() {
        let err = decode_image(b"definitely not a png").unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }

    #[test]
    fn missing_tesseract_is_unavailable() {
        let r = TesseractCli::default().with_program("tesseract-does-not-exist-4f1c");
        let err = r.recognize(&blank()).unwrap_err();
        assert!(matches!(err, ExtractionError::EngineUnavailable(_)));
    }
}
