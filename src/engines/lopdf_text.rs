//! Pure-Rust text layer through lopdf.
//!
//! Sees only the text content streams (no geometry), so it contributes
//! page text but never tables. Its value is as a second opinion: pdfium and
//! lopdf decode fonts differently and each recovers text the other misses.

use super::TextLayerEngine;
use crate::error::EngineError;
use crate::pipeline::pages::PageExtraction;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

const ENGINE: &str = "lopdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    fn load(&self, path: &Path) -> Result<Document, EngineError> {
        Document::load(path).map_err(|e| EngineError::Open {
            engine: ENGINE,
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

impl TextLayerEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn sample_text(&self, path: &Path, limit: usize) -> Result<(usize, Vec<String>), EngineError> {
        let document = self.load(path)?;
        let pages = document.get_pages();
        let texts = pages
            .keys()
            .take(limit)
            .map(|&number| {
                document
                    .extract_text(&[number])
                    .map_err(|e| EngineError::Page {
                        engine: ENGINE,
                        page: number as usize,
                        detail: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((pages.len(), texts))
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageExtraction>, EngineError> {
        let document = self.load(path)?;
        let out = document
            .get_pages()
            .keys()
            .map(|&number| {
                let text = document.extract_text(&[number]).unwrap_or_else(|e| {
                    warn!("lopdf: page {}: text extraction failed: {}", number, e);
                    String::new()
                });
                PageExtraction::new(number as usize, text)
            })
            .collect();
        Ok(out)
    }
}
