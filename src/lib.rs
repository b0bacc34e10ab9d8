//! # pdf2expense
//!
//! Turn invoices, receipts and bills (digital or scanned PDFs) into
//! structured JSON with every expense line assigned to a category.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, download URL or stage bytes
//!  ├─ 2. Classify  sample the text layer: digital or scanned?
//!  ├─ 3. Extract   digital: pdfium + lopdf text layers, merged per page
//!  │               scanned: raster OCR (tesseract), else structure OCR (paddle)
//!  ├─ 4. Structure one deterministic LLM call with the expense prompt
//!  └─ 5. Validate  parse the response as JSON
//! ```
//!
//! Engines are probed once ([`Engines::probe`]) and injected; a missing
//! engine is an explicit [`engines::Capability::Unavailable`] and its stage
//! is skipped. Runs against stored documents go through
//! [`DocumentLifecycle`], which records `processing`, `completed` or
//! `failed` on the [`Document`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2expense::{extract_json, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract_json("invoice.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.data)?);
//!     eprintln!("{} via {}", output.stats.page_count, output.method);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2expense` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2expense = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Used for | Missing → |
//! |------|----------|-----------|
//! | pdfium shared library | classification, text layer, rasterisation | lopdf text layer only; scanned PDFs fall to structure OCR |
//! | `tesseract` | raster OCR | structure OCR only |
//! | `paddleocr` (PP-StructureV3) | structure OCR | raster OCR only |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod engines;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ScanStrategy};
pub use document::{Document, DocumentId, DocumentStatus};
pub use engines::Engines;
pub use error::{FailureKind, LifecycleError, PipelineError, Stage};
pub use extract::{extract_json, extract_json_from_bytes, extract_json_sync, inspect, Pipeline};
pub use lifecycle::{DocumentLifecycle, Reprocess};
pub use output::{InspectReport, RunStats, StructuredOutput};
pub use pipeline::llm::{CompletionModel, CompletionRequest, ProviderModel};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use store::{MemoryStore, RecordStore, SqliteStore};
