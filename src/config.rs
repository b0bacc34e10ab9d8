//! Configuration for the extraction pipeline.
//!
//! Every knob lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. Defaults: three sampled pages for
//! classification, zoom 3 for raster OCR, a 20-character floor for
//! meaningful extraction and a deterministic model call (temperature 0,
//! 4000 output tokens).

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for one pipeline instance.
///
/// # Example
/// ```rust
/// use pdf2expense::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-mini")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 4000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    // ── Classification ────────────────────────────────────────────────────
    /// Pages sampled from the start of the document. Default: 3.
    pub sample_pages: usize,

    /// A sampled page is text-bearing when its trimmed text is longer than
    /// this. Default: 10.
    pub text_page_min_chars: usize,

    // ── Extraction ────────────────────────────────────────────────────────
    /// An extraction is meaningful when its content is longer than this.
    /// Default: 20.
    pub meaningful_text_min_chars: usize,

    /// Render scale for raster OCR. Default: 3.0.
    pub raster_zoom: f32,

    /// Scanned-document strategies in preference order. Default: raster OCR,
    /// then structure OCR.
    pub scan_strategies: Vec<ScanStrategy>,

    /// Directory holding the pdfium shared library. Falls back to
    /// `PDFIUM_LIB_PATH`, then the system library path.
    pub pdfium_lib_dir: Option<PathBuf>,

    /// Tesseract executable. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Tesseract language pack. Default: `eng`.
    pub tesseract_lang: String,

    /// PaddleOCR executable (provides `pp_structurev3`). Default: `paddleocr`.
    pub paddleocr_cmd: String,

    // ── Structuring ───────────────────────────────────────────────────────
    /// Minimum normalized characters handed to the model. Default: 10.
    pub structuring_min_chars: usize,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum output tokens. Default: 4000.
    pub max_tokens: usize,

    /// Retries after a failed or timed-out model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, the built-in expense prompt is used.
    pub system_prompt: Option<String>,

    // ── Input ─────────────────────────────────────────────────────────────
    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,

    // ── Observability ─────────────────────────────────────────────────────
    /// Optional stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_pages: 3,
            text_page_min_chars: 10,
            meaningful_text_min_chars: 20,
            raster_zoom: 3.0,
            scan_strategies: vec![ScanStrategy::RasterOcr, ScanStrategy::StructureOcr],
            pdfium_lib_dir: None,
            tesseract_cmd: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
            paddleocr_cmd: "paddleocr".to_string(),
            structuring_min_chars: 10,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("sample_pages", &self.sample_pages)
            .field("text_page_min_chars", &self.text_page_min_chars)
            .field("meaningful_text_min_chars", &self.meaningful_text_min_chars)
            .field("raster_zoom", &self.raster_zoom)
            .field("scan_strategies", &self.scan_strategies)
            .field("pdfium_lib_dir", &self.pdfium_lib_dir)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("paddleocr_cmd", &self.paddleocr_cmd)
            .field("structuring_min_chars", &self.structuring_min_chars)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn sample_pages(mut self, n: usize) -> Self {
        self.config.sample_pages = n;
        self
    }

    pub fn text_page_min_chars(mut self, n: usize) -> Self {
        self.config.text_page_min_chars = n;
        self
    }

    pub fn meaningful_text_min_chars(mut self, n: usize) -> Self {
        self.config.meaningful_text_min_chars = n;
        self
    }

    pub fn raster_zoom(mut self, zoom: f32) -> Self {
        self.config.raster_zoom = zoom.clamp(0.5, 8.0);
        self
    }

    pub fn scan_strategies(mut self, order: Vec<ScanStrategy>) -> Self {
        self.config.scan_strategies = order;
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_dir = Some(dir.into());
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    pub fn paddleocr_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.paddleocr_cmd = cmd.into();
        self
    }

    pub fn structuring_min_chars(mut self, n: usize) -> Self {
        self.config.structuring_min_chars = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, PipelineError> {
        let c = &self.config;
        if c.sample_pages == 0 {
            return Err(PipelineError::InvalidConfig(
                "sample_pages must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.scan_strategies.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one scan strategy is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// An extraction strategy for scanned documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Render pages and run line OCR on each bitmap.
    RasterOcr,
    /// Layout-aware OCR over the whole document, including tables.
    StructureOcr,
}

impl ScanStrategy {
    /// Parse a comma-separated preference list such as `raster,structure`.
    pub fn parse_list(s: &str) -> Result<Vec<ScanStrategy>, PipelineError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.to_lowercase().as_str() {
                "raster" | "raster_ocr" => Ok(ScanStrategy::RasterOcr),
                "structure" | "structure_ocr" => Ok(ScanStrategy::StructureOcr),
                other => Err(PipelineError::InvalidConfig(format!(
                    "unknown scan strategy '{other}' (expected raster or structure)"
                ))),
            })
            .collect()
    }
}
