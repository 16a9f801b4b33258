//! Prompts for turning label text into a plain-language explanation.
//!
//! The safety rules are enforced only through this instruction, so they are
//! kept in one constant and unit-tested for order and content. The prompt is
//! assembled as:
//!
//! ```text
//! SAFETY_PREAMBLE
//! <language directive>
//!
//! Here is the text to explain:
//! <extracted text, verbatim>
//! ```

use crate::config::Language;

/// Phrase the model must answer with when the label is unreadable noise.
pub const UNREADABLE_FALLBACK: &str = "Could not read the label clearly";

/// Section heading markers, in the order the model must emit them.
pub const SECTION_HEADERS: [&str; 4] = [
    "## 💊 Medicine Name",
    "## 🩺 What it is for",
    "## 🕒 How to take",
    "## ⚠️ Important note",
];

/// Persona and the seven non-negotiable rules.
pub const SAFETY_PREAMBLE: &str = "You are a helpful assistant for elderly patients. \
Your task is to rewrite the given medicine label text in extremely simple, easy-to-understand language. \
Rules:
1. DO NOT change any dosage information (numbers, mg, ml, times per day, how many days).
2. DO NOT give medical advice beyond what is on the label.
3. DO NOT diagnose diseases or recommend medicines.
4. Only explain what is written on the medicine label.
5. Emphasize warnings (like 'Keep out of reach of children') and keep their meaning exactly.
6. If the text is messy code or noise, say 'Could not read the label clearly'.
7. Format the output using exactly these four headers, in this order:
   ## 💊 Medicine Name
   ## 🩺 What it is for
   ## 🕒 How to take
   ## ⚠️ Important note
";

/// Directive for English output.
pub const ENGLISH_DIRECTIVE: &str = "Keep the output in simple English.";

/// Directive for Tamil output. Translation is applied to the already
/// simplified explanation, so the dosage rule still governs its content.
pub const TAMIL_DIRECTIVE: &str = "Translate the simplified explanation into clear, spoken-style Tamil (Tamil script). \
Keep the emoji at the start of each header and keep every number and unit exactly as written.";

/// Directive appended for the given output language.
pub fn language_directive(language: Language) -> &'static str {
    match language {
        Language::English => ENGLISH_DIRECTIVE,
        Language::Tamil => TAMIL_DIRECTIVE,
    }
}

/// Build the full instruction for one label.
pub fn build_prompt(label_text: &str, language: Language) -> String {
    format!(
        "{SAFETY_PREAMBLE}\n{}\n\nHere is the text to explain:\n{label_text}",
        language_directive(language)
    )
}
