//! Result types returned by the pipeline entry points.

use crate::pipeline::classify::Classification;
use crate::pipeline::pages::{Extraction, ExtractionMethod};
use serde::{Deserialize, Serialize};

/// Characters of extracted text shown by [`InspectReport::preview`].
pub const PREVIEW_CHARS: usize = 500;

/// Text longer than this (trimmed) counts as a successful extraction in an
/// [`InspectReport`].
pub const INSPECT_OK_MIN_CHARS: usize = 10;

/// A successful run: validated JSON plus how it was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredOutput {
    /// The model's answer, parsed.
    pub data: serde_json::Value,
    pub classification: Classification,
    pub method: ExtractionMethod,
    pub stats: RunStats,
}

/// Sizes and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub page_count: usize,
    /// Normalized page content extracted, excluding headers and placeholders.
    pub content_chars: usize,
    /// Length of the text sent to the model.
    pub structured_input_chars: usize,
    pub classify_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub structure_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Classification and extraction without the model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOutput {
    pub classification: Classification,
    pub extraction: Extraction,
    pub classify_duration_ms: u64,
    pub extract_duration_ms: u64,
}

/// Diagnostic summary of what the extractors see in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReport {
    /// `"digital"` or `"scanned"`.
    pub pdf_type: String,
    pub method: ExtractionMethod,
    pub page_count: usize,
    /// Characters in the full extracted text blob.
    pub text_length: usize,
    pub preview: String,
    pub ok: bool,
    pub classification_fallback: Option<String>,
}

impl InspectReport {
    pub fn from_text(text: &TextOutput) -> Self {
        let blob = &text.extraction.text;
        Self {
            pdf_type: if text.classification.digital {
                "digital".to_string()
            } else {
                "scanned".to_string()
            },
            method: text.extraction.method,
            page_count: text.extraction.page_count,
            text_length: blob.chars().count(),
            preview: blob.chars().take(PREVIEW_CHARS).collect(),
            ok: blob.trim().chars().count() > INSPECT_OK_MIN_CHARS,
            classification_fallback: text.classification.fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_output(digital: bool, blob: &str) -> TextOutput {
        TextOutput {
            classification: Classification {
                digital,
                total_pages: 1,
                sampled_pages: 1,
                text_pages: usize::from(digital),
                fallback: None,
            },
            extraction: Extraction {
                text: blob.to_string(),
                method: if digital {
                    ExtractionMethod::Digital
                } else {
                    ExtractionMethod::RasterOcr
                },
                page_count: 1,
                content_chars: blob.len(),
            },
            classify_duration_ms: 0,
            extract_duration_ms: 0,
        }
    }

    #[test]
    fn preview_is_capped() {
        let long = "x".repeat(2_000);
        let report = InspectReport::from_text(&text_output(true, &long));
        assert_eq!(report.pdf_type, "digital");
        assert_eq!(report.text_length, 2_000);
        assert_eq!(report.preview.chars().count(), PREVIEW_CHARS);
        assert!(report.ok);
    }

    #[test]
    fn short_text_is_not_ok() {
        let report = InspectReport::from_text(&text_output(false, "  0123456789  "));
        assert_eq!(report.pdf_type, "scanned");
        assert!(!report.ok);
        assert_eq!(report.preview, "  0123456789  ");
    }
}
