//! pdfium-backed text layer and page rasterizer.
//!
//! pdfium is bound fresh for each call; the engine itself only holds the
//! library directory.

use super::{PageRasterizer, TextLayerEngine};
use crate::error::EngineError;
use crate::pipeline::pages::PageExtraction;
use crate::pipeline::tables::{detect_tables, TextRun};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ENGINE: &str = "pdfium";

/// Text extraction, table detection and rendering through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    lib_dir: Option<PathBuf>,
}

impl PdfiumEngine {
    /// Bind once to make sure a pdfium library can be found.
    ///
    /// `lib_dir` is searched first, then the `PDFIUM_LIB_PATH` directory,
    /// then the system library path.
    pub fn new(lib_dir: Option<PathBuf>) -> Result<Self, EngineError> {
        let engine = Self { lib_dir };
        engine.bind()?;
        Ok(engine)
    }

    fn bind(&self) -> Result<Pdfium, EngineError> {
        let dir = self
            .lib_dir
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| EngineError::Unavailable {
                engine: ENGINE.to_string(),
                reason: format!(
                    "failed to bind to a pdfium library ({e:?}); \
                     set PDFIUM_LIB_PATH to the directory holding libpdfium"
                ),
            })?;
        Ok(Pdfium::new(bindings))
    }

    fn open<'a>(&self, pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, EngineError> {
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| EngineError::Open {
                engine: ENGINE,
                path: path.to_path_buf(),
                detail: format!("{e:?}"),
            })
    }
}

impl TextLayerEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn sample_text(&self, path: &Path, limit: usize) -> Result<(usize, Vec<String>), EngineError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, path)?;
        let pages = document.pages();
        let total = pages.len() as usize;

        let mut texts = Vec::with_capacity(limit.min(total));
        for (idx, page) in pages.iter().take(limit).enumerate() {
            let text = page.text().map_err(|e| EngineError::Page {
                engine: ENGINE,
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;
            texts.push(text.all());
        }
        Ok((total, texts))
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<PageExtraction>, EngineError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, path)?;

        let mut out = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let page_no = idx + 1;
            let text = match page.text() {
                Ok(text) => text,
                Err(e) => {
                    warn!("pdfium: page {}: no text layer ({:?})", page_no, e);
                    out.push(PageExtraction::new(page_no, ""));
                    continue;
                }
            };

            let runs: Vec<TextRun> = text
                .segments()
                .iter()
                .map(|segment| {
                    let bounds = segment.bounds();
                    TextRun::new(
                        segment.text(),
                        bounds.left().value,
                        bounds.right().value,
                        bounds.bottom().value,
                    )
                })
                .collect();

            let mut extraction = PageExtraction::new(page_no, text.all());
            extraction.tables = detect_tables(&runs);
            debug!(
                "pdfium: page {}: {} segments, {} table(s)",
                page_no,
                runs.len(),
                extraction.tables.len()
            );
            out.push(extraction);
        }
        Ok(out)
    }
}

impl PageRasterizer for PdfiumEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn for_each_page(
        &self,
        path: &Path,
        zoom: f32,
        visit: &mut dyn FnMut(usize, Result<DynamicImage, EngineError>),
    ) -> Result<usize, EngineError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, path)?;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(zoom);

        let mut count = 0;
        for (idx, page) in document.pages().iter().enumerate() {
            count += 1;
            let page_no = idx + 1;
            let rendered = page
                .render_with_config(&render_config)
                .map(|bitmap| bitmap.as_image())
                .map_err(|e| EngineError::Page {
                    engine: ENGINE,
                    page: page_no,
                    detail: format!("{e:?}"),
                });
            if let Ok(image) = &rendered {
                debug!(
                    "pdfium: rendered page {} → {}x{} px",
                    page_no,
                    image.width(),
                    image.height()
                );
            }
            visit(page_no, rendered);
        }
        Ok(count)
    }
}
