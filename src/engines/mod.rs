//! Extraction engine capabilities.
//!
//! The pipeline never constructs an engine itself. [`Engines::probe`] builds
//! every engine once at startup and records, per capability, either a shared
//! handle or the reason it is unavailable. The extractors receive the
//! [`Engines`] value and skip unavailable capabilities without retrying
//! construction. Tests build [`Engines`] directly from fakes.
//!
//! All engine calls are blocking; the pipeline runs them inside
//! `tokio::task::spawn_blocking`.
//!
//! | Capability          | Default engine                  |
//! |---------------------|---------------------------------|
//! | [`TextLayerEngine`] | [`pdfium::PdfiumEngine`], then [`lopdf_text::LopdfEngine`] |
//! | [`PageRasterizer`]  | [`pdfium::PdfiumEngine`]        |
//! | [`LineOcrEngine`]   | [`tesseract::TesseractEngine`]  |
//! | [`LayoutOcrEngine`] | [`paddle::PaddleStructureEngine`] |

pub mod lopdf_text;
pub mod paddle;
pub mod pdfium;
pub mod tesseract;

use crate::config::ExtractionConfig;
use crate::error::EngineError;
use crate::pipeline::pages::PageExtraction;
use image::{DynamicImage, GrayImage};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Reads the embedded text layer of a PDF.
pub trait TextLayerEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Total page count and the text of the first `limit` pages.
    fn sample_text(&self, path: &Path, limit: usize) -> Result<(usize, Vec<String>), EngineError>;

    /// Text (and tables, where the engine can see them) for every page.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageExtraction>, EngineError>;
}

/// Renders pages to bitmaps.
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render every page at `zoom` × the page's native size, handing each
    /// 1-based page number and its bitmap (or render error) to `visit`.
    /// Returns the page count. Fails only when the document cannot be opened.
    fn for_each_page(
        &self,
        path: &Path,
        zoom: f32,
        visit: &mut dyn FnMut(usize, Result<DynamicImage, EngineError>),
    ) -> Result<usize, EngineError>;
}

/// One recognized line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub confidence: f32,
}

/// Line-level OCR over a single bitmap.
pub trait LineOcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recognized lines in detection order.
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedLine>, EngineError>;
}

/// Layout-aware OCR over a whole document: text lines plus table regions.
pub trait LayoutOcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// One entry per page; tables are `TableBlock::Markup`.
    fn analyze(&self, path: &Path) -> Result<Vec<PageExtraction>, EngineError>;
}

/// An engine handle, or the reason it could not be constructed.
pub enum Capability<T: ?Sized> {
    Ready(Arc<T>),
    Unavailable { engine: String, reason: String },
}

impl<T: ?Sized> Capability<T> {
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Capability::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Capability::Ready(_))
    }

    /// The handle, or an [`EngineError::Unavailable`] naming the reason.
    pub fn get(&self) -> Result<&Arc<T>, EngineError> {
        match self {
            Capability::Ready(engine) => Ok(engine),
            Capability::Unavailable { engine, reason } => Err(EngineError::Unavailable {
                engine: engine.clone(),
                reason: reason.clone(),
            }),
        }
    }
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Capability::Ready(engine) => Capability::Ready(Arc::clone(engine)),
            Capability::Unavailable { engine, reason } => Capability::Unavailable {
                engine: engine.clone(),
                reason: reason.clone(),
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Ready(_) => f.write_str("Ready"),
            Capability::Unavailable { engine, reason } => f
                .debug_struct("Unavailable")
                .field("engine", engine)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Every engine the pipeline can use, built once and shared across runs.
#[derive(Clone, Debug)]
pub struct Engines {
    /// Text-layer engines in merge order; the first ready one also drives
    /// classification.
    pub text_layers: Vec<Capability<dyn TextLayerEngine>>,
    pub rasterizer: Capability<dyn PageRasterizer>,
    pub line_ocr: Capability<dyn LineOcrEngine>,
    pub layout_ocr: Capability<dyn LayoutOcrEngine>,
}

impl Engines {
    /// Construct every default engine, recording the ones that are missing.
    ///
    /// Never fails: a missing pdfium library or OCR binary only disables the
    /// capabilities that depend on it.
    pub fn probe(config: &ExtractionConfig) -> Self {
        let pdfium_engine: Capability<pdfium::PdfiumEngine> =
            match pdfium::PdfiumEngine::new(config.pdfium_lib_dir.clone()) {
                Ok(engine) => Capability::Ready(Arc::new(engine)),
                Err(e) => Capability::unavailable("pdfium", e.to_string()),
            };

        let text_pdfium: Capability<dyn TextLayerEngine> = match &pdfium_engine {
            Capability::Ready(engine) => Capability::Ready(engine.clone() as Arc<dyn TextLayerEngine>),
            Capability::Unavailable { engine, reason } => {
                Capability::unavailable(engine.clone(), reason.clone())
            }
        };
        let rasterizer: Capability<dyn PageRasterizer> = match &pdfium_engine {
            Capability::Ready(engine) => Capability::Ready(engine.clone() as Arc<dyn PageRasterizer>),
            Capability::Unavailable { engine, reason } => {
                Capability::unavailable(engine.clone(), reason.clone())
            }
        };

        let line_ocr: Capability<dyn LineOcrEngine> = if command_available(&config.tesseract_cmd) {
            Capability::Ready(Arc::new(tesseract::TesseractEngine::new(
                config.tesseract_cmd.clone(),
                config.tesseract_lang.clone(),
            )))
        } else {
            Capability::unavailable(
                "tesseract",
                format!("`{} --version` could not be run", config.tesseract_cmd),
            )
        };

        let layout_ocr: Capability<dyn LayoutOcrEngine> = if command_available(&config.paddleocr_cmd) {
            Capability::Ready(Arc::new(paddle::PaddleStructureEngine::new(
                config.paddleocr_cmd.clone(),
            )))
        } else {
            Capability::unavailable(
                "pp-structure",
                format!("`{} --version` could not be run", config.paddleocr_cmd),
            )
        };

        let engines = Self {
            text_layers: vec![
                text_pdfium,
                Capability::Ready(Arc::new(lopdf_text::LopdfEngine) as Arc<dyn TextLayerEngine>),
            ],
            rasterizer,
            line_ocr,
            layout_ocr,
        };
        engines.log_status();
        engines
    }

    fn log_status(&self) {
        let all = self
            .text_layers
            .iter()
            .map(|c| c.get().map(|_| ()))
            .chain([
                self.rasterizer.get().map(|_| ()),
                self.line_ocr.get().map(|_| ()),
                self.layout_ocr.get().map(|_| ()),
            ]);
        for status in all {
            if let Err(e) = status {
                warn!("Engine disabled: {}", e);
            }
        }
        info!(
            "Engines ready: {} text layer(s), rasterizer={}, line OCR={}, layout OCR={}",
            self.text_layers.iter().filter(|c| c.is_ready()).count(),
            self.rasterizer.is_ready(),
            self.line_ocr.is_ready(),
            self.layout_ocr.is_ready()
        );
    }
}

/// Return `true` if `<program> --version` can be spawned.
pub fn command_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}
