//! Post-processing: deterministic cleanup of generated explanations.
//!
//! Even a well-prompted local model wraps its answer in ```` ```markdown ````
//! fences now and then, opens with "Sure! Here is the explanation:", or
//! leaves Windows line endings behind. The rules here fix those quirks
//! without touching content.
//!
//! ## Rule Order
//!
//! Normalise line endings before matching fences, strip fences before looking for
//! the first heading, and run the final-newline pass last.
//!
//! This module also holds the two text helpers used downstream:
//! [`strip_emphasis`] (speech input) and [`dosage_tokens`] (verification).

use crate::output::Section;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer markdown fences
/// 3. Trim trailing whitespace per line
/// 4. Drop chatter before the first section heading
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure heading lines have a blank line before them
/// 7. Strip invisible Unicode (zero-width space, BOM, soft hyphen)
/// 8. Ensure the text ends with exactly one newline
pub fn clean_explanation(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_markdown_fences(&s);
    let s = trim_trailing_whitespace(&s);
    let s = drop_lead_in(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop chatter before the first section heading ───────────────────

fn drop_lead_in(input: &str) -> String {
    let is_section_heading = |line: &str| {
        let t = line.trim_start();
        t.starts_with('#') && Section::ALL.iter().any(|s| t.contains(s.marker()))
    };
    match input.lines().position(is_section_heading) {
        Some(0) | None => input.to_string(),
        Some(first) => input.lines().skip(first).collect::<Vec<_>>().join("\n"),
    }
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Normalise heading spacing ────────────────────────────────────────

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 32);
    for (i, line) in input.lines().enumerate() {
        if line.starts_with('#') && i > 0 {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 7: Remove invisible Unicode characters ─────────────────────────────
//
// ZWJ/ZWNJ are left alone: Tamil text uses them for conjunct control.

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

// ── Rule 8: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Speech input ─────────────────────────────────────────────────────────────

/// Remove markdown emphasis markers (`#`, `*`) so a speech engine reads
/// prose only. Lines are trimmed; the result has no trailing newline.
///
/// `"## Title\n*Warning*"` becomes `"Title\nWarning"`.
pub fn strip_emphasis(input: &str) -> String {
    input
        .replace(['#', '*'], "")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ── Dosage tokens ────────────────────────────────────────────────────────────

static RE_DOSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:every\s+\d+(?:\.\d+)?\s*(?:hours?|hrs?|days?|weeks?)|(?:once|twice|thrice)\s+(?:a\s+day|daily)|\d+(?:\.\d+)?\s*(?:mg|mcg|µg|g|ml|iu|units?|tablets?|capsules?|drops?|puffs?|times?|hours?|hrs?|days?|weeks?))\b",
    )
    .unwrap()
});

static RE_MEASURED_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+(?:\.\d+)?\s*(?:mg|mcg|µg|g|ml|iu)$").unwrap());

/// A number with a measurement unit (`500mg`, `5 ml`). These stay as written
/// in a translated explanation; phrases like `every 8 hours` do not.
pub fn is_measured_amount(token: &str) -> bool {
    RE_MEASURED_AMOUNT.is_match(token)
}

/// Numeric dosage and frequency phrases in `text`, in order, deduplicated.
///
/// Matches amounts (`500mg`, `5 ml`, `1 tablet`), intervals (`every 8 hours`)
/// and frequencies (`twice daily`).
pub fn dosage_tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in RE_DOSAGE.find_iter(text) {
        let token = m.as_str().to_string();
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n## 💊 Medicine Name\nX\n```";
        assert_eq!(strip_markdown_fences(input), "## 💊 Medicine Name\nX");
    }

    #[test]
    fn test_no_fences_passthrough() {
        let input = "## 💊 Medicine Name\nX";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_drop_lead_in() {
        let input = "Sure! Here is the explanation:\n\n## 💊 Medicine Name\nAmoxicillin";
        assert_eq!(drop_lead_in(input), "## 💊 Medicine Name\nAmoxicillin");
    }

    #[test]
    fn test_lead_in_kept_without_headings() {
        let input = "Could not read the label clearly.";
        assert_eq!(drop_lead_in(input), input);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_heading_spacing() {
        let result = normalise_heading_spacing("intro\n## 🕒 How to take\nTwice daily");
        assert!(result.contains("intro\n\n## 🕒 How to take\n"));
    }

    #[test]
    fn test_remove_invisible_keeps_joiners() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
        assert_eq!(remove_invisible_chars("க்\u{200D}ஷ"), "க்\u{200D}ஷ");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline("  \n"), "");
    }

    #[test]
    fn test_clean_explanation_full() {
        let input = "```\r\nHere you go:\r\n## 💊 Medicine Name   \r\nAmoxicillin\r\n\r\n\r\n\r\n\r\n## 🩺 What it is for\r\nInfections\r\n```";
        let out = clean_explanation(input);
        assert!(out.starts_with("## 💊 Medicine Name\nAmoxicillin"));
        assert!(!out.contains('\r'));
        assert!(!out.contains("\n\n\n\n"));
        assert!(out.ends_with("Infections\n"));
    }

    #[test]
    fn test_strip_emphasis() {
        assert_eq!(strip_emphasis("## Title\n*Warning*"), "Title\nWarning");
        assert_eq!(strip_emphasis("**Take 500mg** daily"), "Take 500mg daily");
        assert_eq!(strip_emphasis(&strip_emphasis("## A\n* b")), "A\nb");
    }

    #[test]
    fn test_dosage_tokens() {
        let text = "Rx: Amoxicillin 500mg. Take 1 tablet every 8 hours for 7 days. Warning: May cause drowsiness.";
        assert_eq!(
            dosage_tokens(text),
            vec!["500mg", "1 tablet", "every 8 hours", "7 days"]
        );
    }

    #[test]
    fn test_is_measured_amount() {
        assert!(is_measured_amount("500mg"));
        assert!(is_measured_amount("5 ml"));
        assert!(is_measured_amount("2.5 MG"));
        assert!(!is_measured_amount("1 tablet"));
        assert!(!is_measured_amount("every 8 hours"));
        assert!(!is_measured_amount("7 days"));
    }

    #[test]
    fn test_dosage_frequency_words() {
        let tokens = dosage_tokens("Use 5 ml twice daily. 2.5 mg once a day.");
        assert_eq!(tokens, vec!["5 ml", "twice daily", "2.5 mg", "once a day"]);
    }

    #[test]
    fn test_dosage_tokens_none() {
        assert!(dosage_tokens("Keep out of reach of children").is_empty());
    }
}
