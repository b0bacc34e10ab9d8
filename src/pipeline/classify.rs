//! Digital-versus-scanned classification.
//!
//! A document is digital when at least half of its first few pages carry a
//! real text layer. The sample is read through the first text-layer engine
//! that is available. Classification never fails: if no engine is available
//! or the document cannot be read, it is treated as digital and the digital
//! extractor gets the first attempt.

use crate::engines::{Capability, TextLayerEngine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub digital: bool,
    pub total_pages: usize,
    pub sampled_pages: usize,
    pub text_pages: usize,
    /// Why the fail-open path was taken, if it was.
    pub fallback: Option<String>,
}

impl Classification {
    fn fail_open(reason: String) -> Self {
        Self {
            digital: true,
            total_pages: 0,
            sampled_pages: 0,
            text_pages: 0,
            fallback: Some(reason),
        }
    }
}

/// Classify the PDF at `path` using the first ready engine in `engines`.
///
/// Samples up to `sample_pages` pages; a page counts as text-bearing when
/// its trimmed text is longer than `min_chars` characters. A document with
/// no pages is scanned.
pub fn classify(
    engines: &[Capability<dyn TextLayerEngine>],
    path: &Path,
    sample_pages: usize,
    min_chars: usize,
) -> Classification {
    let Some(engine) = engines.iter().find_map(|c| c.get().ok()) else {
        let reason = if engines.is_empty() {
            "no text layer engine configured".to_string()
        } else {
            engines
                .iter()
                .filter_map(|c| c.get().err())
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        };
        warn!("Classification fell back to digital: {}", reason);
        return Classification::fail_open(reason);
    };
    debug!("Classifying with {}", engine.name());

    let (total_pages, texts) = match engine.sample_text(path, sample_pages) {
        Ok(sample) => sample,
        Err(e) => {
            warn!("Classification fell back to digital: {}", e);
            return Classification::fail_open(e.to_string());
        }
    };

    let sampled_pages = texts.len();
    let text_pages = texts
        .iter()
        .filter(|t| t.trim().chars().count() > min_chars)
        .count();
    let digital = sampled_pages > 0 && text_pages * 2 >= sampled_pages;

    debug!(
        "Classified '{}': {}/{} sampled pages with text ({} total) → {}",
        path.display(),
        text_pages,
        sampled_pages,
        total_pages,
        if digital { "digital" } else { "scanned" }
    );

    Classification {
        digital,
        total_pages,
        sampled_pages,
        text_pages,
        fallback: None,
    }
}
