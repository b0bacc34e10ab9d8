//! Pipeline orchestration: source → classification → extraction →
//! structuring → validated JSON.
//!
//! [`Pipeline`] owns the probed engines and the structurer and can be shared
//! across documents. The free functions at the bottom build a throwaway
//! pipeline per call for one-shot use.

use crate::config::{ExtractionConfig, ScanStrategy};
use crate::engines::Engines;
use crate::error::{PipelineError, Stage};
use crate::output::{InspectReport, RunStats, StructuredOutput, TextOutput};
use crate::pipeline::classify::{classify, Classification};
use crate::pipeline::digital::extract_digital;
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::{CompletionModel, ProviderModel, Structurer};
use crate::pipeline::normalize::normalized_len;
use crate::pipeline::pages::Extraction;
use crate::pipeline::postprocess;
use crate::pipeline::scanned::extract_scanned;
use crate::progress::PipelineProgressCallback;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured extraction pipeline.
pub struct Pipeline {
    config: ExtractionConfig,
    engines: Engines,
    structurer: Structurer,
}

impl Pipeline {
    /// Assemble a pipeline from already-built parts.
    pub fn new(config: ExtractionConfig, engines: Engines, model: Arc<dyn CompletionModel>) -> Self {
        let structurer = Structurer::new(model, &config);
        Self {
            config,
            engines,
            structurer,
        }
    }

    /// Probe the engines and resolve the LLM provider from `config`.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, PipelineError> {
        let model = ProviderModel::from_config(&config)?;
        let engines = Engines::probe(&config);
        Ok(Self::new(config, engines, Arc::new(model)))
    }

    /// Replace the structurer, e.g. to change its call policy.
    pub fn with_structurer(mut self, structurer: Structurer) -> Self {
        self.structurer = structurer;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Resolve `source` (path or URL) and run the full pipeline on it.
    pub async fn run(&self, source: &str) -> Result<StructuredOutput, PipelineError> {
        let resolved = input::resolve_input(source, self.config.download_timeout_secs).await?;
        self.run_resolved(source, &resolved).await
    }

    /// Run the full pipeline on an in-memory PDF.
    pub async fn run_bytes(&self, bytes: &[u8], filename: &str) -> Result<StructuredOutput, PipelineError> {
        let resolved = input::stage_bytes(bytes, filename)?;
        self.run_resolved(filename, &resolved).await
    }

    async fn run_resolved(
        &self,
        label: &str,
        resolved: &ResolvedInput,
    ) -> Result<StructuredOutput, PipelineError> {
        self.notify(|cb| cb.on_run_start(label));
        let result = self.run_path(resolved.path()).await;
        match &result {
            Ok(_) => self.notify(|cb| cb.on_run_complete(None)),
            Err(e) => {
                let message = e.to_string();
                self.notify(|cb| cb.on_run_complete(Some(&message)));
            }
        }
        result
    }

    /// Run the full pipeline on a local PDF.
    pub async fn run_path(&self, path: &Path) -> Result<StructuredOutput, PipelineError> {
        let total_start = Instant::now();
        info!("Starting extraction: {}", path.display());

        // ── Step 1-2: Classify and extract ───────────────────────────────
        let text = self.extract_text(path).await?;
        let extraction = &text.extraction;
        let threshold = self.config.meaningful_text_min_chars;
        if !extraction.is_meaningful(threshold) {
            warn!(
                "No meaningful text in {} ({} chars via {})",
                path.display(),
                extraction.content_chars,
                extraction.method
            );
            return Err(PipelineError::ExtractionEmpty {
                method: extraction.method,
                chars: extraction.content_chars,
                threshold,
            });
        }

        // ── Step 3: Structure ────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Structure));
        let structure_start = Instant::now();
        let raw = self.structurer.structure(&extraction.text).await?;
        let structure_duration_ms = structure_start.elapsed().as_millis() as u64;
        self.notify(|cb| {
            cb.on_stage_complete(Stage::Structure, &format!("{} chars returned", raw.len()))
        });

        // ── Step 4: Validate ─────────────────────────────────────────────
        self.notify(|cb| cb.on_stage_start(Stage::Validate));
        let data = postprocess::parse_response(&raw)?;
        self.notify(|cb| cb.on_stage_complete(Stage::Validate, "valid JSON"));

        let stats = RunStats {
            page_count: extraction.page_count,
            content_chars: extraction.content_chars,
            structured_input_chars: normalized_len(&extraction.text),
            classify_duration_ms: text.classify_duration_ms,
            extract_duration_ms: text.extract_duration_ms,
            structure_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {} via {}, {} pages, {}ms total",
            path.display(),
            extraction.method,
            stats.page_count,
            stats.total_duration_ms
        );

        Ok(StructuredOutput {
            data,
            classification: text.classification,
            method: extraction.method,
            stats,
        })
    }

    /// Classify the document and run the matching extractor. No emptiness
    /// check and no model call.
    pub async fn extract_text(&self, path: &Path) -> Result<TextOutput, PipelineError> {
        extract_text_with(&self.engines, &self.config, path).await
    }

    /// Resolve `source` and report what the extractors see, without calling
    /// the model.
    pub async fn inspect(&self, source: &str) -> Result<InspectReport, PipelineError> {
        inspect_with(&self.engines, &self.config, source).await
    }

    fn notify(&self, f: impl FnOnce(&dyn PipelineProgressCallback)) {
        notify(&self.config, f)
    }
}

/// Extract structured JSON from a PDF file or URL.
///
/// This is the primary one-shot entry point; it probes the engines and
/// resolves the provider on every call. Build a [`Pipeline`] once to
/// process many documents.
///
/// ```rust,no_run
/// use pdf2expense::{extract_json, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = extract_json("invoice.pdf", &ExtractionConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&output.data)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract_json(
    source: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<StructuredOutput, PipelineError> {
    Pipeline::from_config(config.clone())?
        .run(source.as_ref())
        .await
}

/// Synchronous wrapper around [`extract_json`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_json_sync(
    source: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<StructuredOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| {
            PipelineError::internal(Stage::Resolve, format!("Failed to create tokio runtime: {e}"))
        })?
        .block_on(extract_json(source, config))
}

/// Extract structured JSON from PDF bytes held in memory.
///
/// The bytes are staged in a temporary file that is removed on return.
/// Empty input is rejected before any engine runs.
pub async fn extract_json_from_bytes(
    bytes: &[u8],
    filename: &str,
    config: &ExtractionConfig,
) -> Result<StructuredOutput, PipelineError> {
    let resolved = input::stage_bytes(bytes, filename)?;
    Pipeline::from_config(config.clone())?
        .run_resolved(filename, &resolved)
        .await
}

/// Classify and extract without calling the model.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    source: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<InspectReport, PipelineError> {
    let engines = Engines::probe(config);
    inspect_with(&engines, config, source.as_ref()).await
}

async fn inspect_with(
    engines: &Engines,
    config: &ExtractionConfig,
    source: &str,
) -> Result<InspectReport, PipelineError> {
    let resolved = input::resolve_input(source, config.download_timeout_secs).await?;
    let text = extract_text_with(engines, config, resolved.path()).await?;
    Ok(InspectReport::from_text(&text))
}

/// Steps 1-2 of every run: classify on a blocking thread, then extract.
async fn extract_text_with(
    engines: &Engines,
    config: &ExtractionConfig,
    path: &Path,
) -> Result<TextOutput, PipelineError> {
    let params = TextParams::from_config(config);

    notify(config, |cb| cb.on_stage_start(Stage::Classify));
    let classify_start = Instant::now();
    let classification = {
        let (engines, params, path) = (engines.clone(), params.clone(), path.to_path_buf());
        tokio::task::spawn_blocking(move || params.classify(&engines, &path))
            .await
            .map_err(|e| PipelineError::internal(Stage::Classify, format!("Classify task panicked: {e}")))?
    };
    let classify_duration_ms = classify_start.elapsed().as_millis() as u64;
    let kind = if classification.digital { "digital" } else { "scanned" };
    notify(config, |cb| {
        cb.on_stage_complete(
            Stage::Classify,
            &format!("{kind}, {} page(s)", classification.total_pages),
        )
    });

    notify(config, |cb| cb.on_stage_start(Stage::Extract));
    let extract_start = Instant::now();
    let extraction = {
        let (engines, path, digital) = (engines.clone(), path.to_path_buf(), classification.digital);
        tokio::task::spawn_blocking(move || params.extract(&engines, &path, digital))
            .await
            .map_err(|e| PipelineError::internal(Stage::Extract, format!("Extract task panicked: {e}")))?
    };
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    debug!(
        "Extracted {} content chars from {} page(s) via {} in {}ms",
        extraction.content_chars, extraction.page_count, extraction.method, extract_duration_ms
    );
    notify(config, |cb| {
        cb.on_stage_complete(
            Stage::Extract,
            &format!("{}, {} chars", extraction.method, extraction.content_chars),
        )
    });

    Ok(TextOutput {
        classification,
        extraction,
        classify_duration_ms,
        extract_duration_ms,
    })
}

fn notify(config: &ExtractionConfig, f: impl FnOnce(&dyn PipelineProgressCallback)) {
    if let Some(ref cb) = config.progress_callback {
        f(cb.as_ref());
    }
}

/// The configuration slice the blocking classify/extract work needs.
#[derive(Clone)]
struct TextParams {
    sample_pages: usize,
    text_page_min_chars: usize,
    scan_strategies: Vec<ScanStrategy>,
    raster_zoom: f32,
    meaningful_text_min_chars: usize,
}

impl TextParams {
    fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            sample_pages: config.sample_pages,
            text_page_min_chars: config.text_page_min_chars,
            scan_strategies: config.scan_strategies.clone(),
            raster_zoom: config.raster_zoom,
            meaningful_text_min_chars: config.meaningful_text_min_chars,
        }
    }

    fn classify(&self, engines: &Engines, path: &Path) -> Classification {
        classify(
            &engines.text_layers,
            path,
            self.sample_pages,
            self.text_page_min_chars,
        )
    }

    fn extract(&self, engines: &Engines, path: &Path, digital: bool) -> Extraction {
        if digital {
            extract_digital(&engines.text_layers, path)
        } else {
            extract_scanned(
                engines,
                path,
                &self.scan_strategies,
                self.raster_zoom,
                self.meaningful_text_min_chars,
            )
        }
    }
}
