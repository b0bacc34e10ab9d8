//! OCR extraction for scanned PDFs.
//!
//! Strategies run in the configured preference order. The first one whose
//! content is longer than the meaningful-text threshold wins and the rest
//! are skipped; if none qualifies the result is empty.

use crate::config::ScanStrategy;
use crate::engines::Engines;
use crate::error::EngineError;
use crate::pipeline::normalize::normalize;
use crate::pipeline::pages::{Extraction, ExtractionMethod, PageExtraction};
use crate::pipeline::raster::prepare_for_ocr;
use std::path::Path;
use tracing::{debug, info, warn};

pub const RASTER_PLACEHOLDER: &str = "[No text detected by raster OCR]";
pub const STRUCTURE_PLACEHOLDER: &str = "[No text detected by structure OCR]";

/// Run the scan strategies in `order` until one yields more than
/// `threshold` characters of content.
pub fn extract_scanned(
    engines: &Engines,
    path: &Path,
    order: &[ScanStrategy],
    zoom: f32,
    threshold: usize,
) -> Extraction {
    for strategy in order {
        let attempt = match strategy {
            ScanStrategy::RasterOcr => raster_ocr(engines, path, zoom),
            ScanStrategy::StructureOcr => structure_ocr(engines, path),
        };
        match attempt {
            Ok(extraction) if extraction.is_meaningful(threshold) => {
                info!(
                    "Scanned extraction: {} selected ({} chars)",
                    extraction.method, extraction.content_chars
                );
                return extraction;
            }
            Ok(extraction) => debug!(
                "Scanned extraction: {} produced only {} chars",
                extraction.method, extraction.content_chars
            ),
            Err(e) => warn!("Scanned extraction: {:?} skipped: {}", strategy, e),
        }
    }
    Extraction::empty(ExtractionMethod::None)
}

/// Render every page and run line OCR on it. A page that fails to render
/// or recognize yields no text; it never aborts the document.
fn raster_ocr(engines: &Engines, path: &Path, zoom: f32) -> Result<Extraction, EngineError> {
    let rasterizer = engines.rasterizer.get()?;
    let ocr = engines.line_ocr.get()?;

    let mut pages = Vec::new();
    rasterizer.for_each_page(path, zoom, &mut |page, rendered| {
        let text = rendered
            .and_then(|image| ocr.recognize(&prepare_for_ocr(&image)))
            .map(|lines| {
                lines
                    .iter()
                    .map(|line| normalize(&line.text))
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_else(|e| {
                warn!("Raster OCR: {}", e);
                String::new()
            });
        pages.push(PageExtraction::new(page, text));
    })?;

    pages.sort_by_key(|p| p.page);
    Ok(Extraction::from_pages(
        &pages,
        ExtractionMethod::RasterOcr,
        Some(RASTER_PLACEHOLDER),
    ))
}

fn structure_ocr(engines: &Engines, path: &Path) -> Result<Extraction, EngineError> {
    let layout = engines.layout_ocr.get()?;
    let mut pages = layout.analyze(path)?;
    pages.sort_by_key(|p| p.page);
    Ok(Extraction::from_pages(
        &pages,
        ExtractionMethod::StructureOcr,
        Some(STRUCTURE_PLACEHOLDER),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{
        Capability, LayoutOcrEngine, LineOcrEngine, PageRasterizer, RecognizedLine,
    };
    use crate::pipeline::pages::TableBlock;
    use image::{DynamicImage, GrayImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Renders `pages` blank bitmaps; the page numbers in `broken` fail.
    struct Blank {
        pages: usize,
        broken: Vec<usize>,
    }

    impl PageRasterizer for Blank {
        fn name(&self) -> &'static str {
            "blank"
        }

        fn for_each_page(
            &self,
            _path: &Path,
            _zoom: f32,
            visit: &mut dyn FnMut(usize, Result<DynamicImage, EngineError>),
        ) -> Result<usize, EngineError> {
            for page in 1..=self.pages {
                if self.broken.contains(&page) {
                    visit(
                        page,
                        Err(EngineError::Page {
                            engine: "blank",
                            page,
                            detail: "render failed".into(),
                        }),
                    );
                } else {
                    visit(page, Ok(DynamicImage::new_luma8(4, 4)));
                }
            }
            Ok(self.pages)
        }
    }

    /// Returns the same lines for every bitmap.
    struct Lines(Vec<&'static str>);

    impl LineOcrEngine for Lines {
        fn name(&self) -> &'static str {
            "lines"
        }

        fn recognize(&self, _image: &GrayImage) -> Result<Vec<RecognizedLine>, EngineError> {
            Ok(self
                .0
                .iter()
                .map(|t| RecognizedLine {
                    text: t.to_string(),
                    confidence: 0.9,
                })
                .collect())
        }
    }

    struct Layout {
        pages: Vec<PageExtraction>,
        calls: Arc<AtomicUsize>,
    }

    impl LayoutOcrEngine for Layout {
        fn name(&self) -> &'static str {
            "layout"
        }

        fn analyze(&self, _path: &Path) -> Result<Vec<PageExtraction>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.clone())
        }
    }

    fn engines(
        raster_pages: usize,
        broken: Vec<usize>,
        lines: Vec<&'static str>,
        layout_pages: Vec<PageExtraction>,
    ) -> (Engines, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engines = Engines {
            text_layers: vec![],
            rasterizer: Capability::Ready(Arc::new(Blank {
                pages: raster_pages,
                broken,
            })),
            line_ocr: Capability::Ready(Arc::new(Lines(lines))),
            layout_ocr: Capability::Ready(Arc::new(Layout {
                pages: layout_pages,
                calls: Arc::clone(&calls),
            })),
        };
        (engines, calls)
    }

    const ORDER: [ScanStrategy; 2] = [ScanStrategy::RasterOcr, ScanStrategy::StructureOcr];

    #[test]
    fn raster_wins_and_skips_structure() {
        let (engines, calls) = engines(
            2,
            vec![],
            vec!["HOTEL GRAND - 2 nights", "Total 240.00"],
            vec![PageExtraction::new(1, "structure text that is long enough")],
        );
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &ORDER, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::RasterOcr);
        assert!(ex.text.starts_with("=== Page 1 ===\n[Text]\nHOTEL GRAND - 2 nights\nTotal 240.00"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn structure_used_when_raster_too_short() {
        let (engines, calls) = engines(
            1,
            vec![],
            vec!["abc"],
            vec![PageExtraction::new(1, "Guest house stay, 3 nights")
                .with_table(TableBlock::Markup("<table><tr><td>1</td></tr></table>".into()))],
        );
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &ORDER, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::StructureOcr);
        assert!(ex.text.contains("[Table 1]\n<table>"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn both_short_yields_empty() {
        let (engines, _) = engines(1, vec![], vec![], vec![PageExtraction::new(1, "tiny")]);
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &ORDER, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::None);
        assert!(ex.text.is_empty());
    }

    #[test]
    fn failed_page_gets_placeholder_and_run_continues() {
        let (engines, _) = engines(3, vec![2], vec!["Laptop purchase 1,299.00"], vec![]);
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &ORDER, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::RasterOcr);
        assert_eq!(ex.page_count, 3);
        assert!(ex
            .text
            .contains(&format!("=== Page 2 ===\n{RASTER_PLACEHOLDER}")));
    }

    #[test]
    fn unavailable_engines_fall_through() {
        let (mut engines, calls) = engines(
            1,
            vec![],
            vec!["would have been enough text"],
            vec![PageExtraction::new(1, "structure recovered this text")],
        );
        engines.line_ocr = Capability::unavailable("tesseract", "not installed");
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &ORDER, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::StructureOcr);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preference_order_is_configurable() {
        let (engines, calls) = engines(
            1,
            vec![],
            vec!["raster text long enough to win"],
            vec![PageExtraction::new(1, "structure text long enough to win")],
        );
        let order = [ScanStrategy::StructureOcr, ScanStrategy::RasterOcr];
        let ex = extract_scanned(&engines, Path::new("x.pdf"), &order, 3.0, 20);
        assert_eq!(ex.method, ExtractionMethod::StructureOcr);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
