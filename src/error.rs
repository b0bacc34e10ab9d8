//! Error types for the pdf2expense library.
//!
//! Three layers of errors, one per layer of the system:
//!
//! * [`PipelineError`]: one run of the extraction pipeline failed. Every
//!   variant is tagged with the [`Stage`] it came from and maps onto a
//!   [`FailureKind`], which is what gets persisted on the document record.
//!
//! * [`LifecycleError`]: a document-level operation was refused or could
//!   not be committed (unknown id, concurrent run, invalid upload, store
//!   failure). Wraps [`PipelineError`] when a run itself failed.
//!
//! * Capability errors ([`EngineError`], [`ModelError`], [`StoreError`]):
//!   raised by the injected engines, language model and record store. The
//!   pipeline folds them into the two types above.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::document::DocumentId;
use crate::pipeline::pages::ExtractionMethod;

/// The pipeline step an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Classify,
    Extract,
    Structure,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolve => "resolve",
            Stage::Classify => "classify",
            Stage::Extract => "extract",
            Stage::Structure => "structure",
            Stage::Validate => "validate",
        };
        f.pad(s)
    }
}

/// Persisted classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ExtractionEmpty,
    InputTooShort,
    ModelCall,
    ModelTimeout,
    ModelOutputParse,
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExtractionEmpty => "extraction_empty",
            FailureKind::InputTooShort => "input_too_short",
            FailureKind::ModelCall => "model_call",
            FailureKind::ModelTimeout => "model_timeout",
            FailureKind::ModelOutputParse => "model_output_parse",
            FailureKind::Unexpected => "unexpected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "extraction_empty" => FailureKind::ExtractionEmpty,
            "input_too_short" => FailureKind::InputTooShort,
            "model_call" => FailureKind::ModelCall,
            "model_timeout" => FailureKind::ModelTimeout,
            "model_output_parse" => FailureKind::ModelOutputParse,
            "unexpected" => FailureKind::Unexpected,
            _ => return None,
        })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source resolution failures (local path or URL).
#[derive(Debug, Error)]
pub enum InputError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file or upload has no content.
    #[error("Input is empty: '{path}'")]
    Empty { path: PathBuf },

    /// Scratch space for a downloaded or in-memory document could not be created.
    #[error("Failed to stage input in a temporary file: {0}")]
    Staging(#[source] std::io::Error),
}

/// A failure inside one extraction engine.
///
/// Engines never abort a run on their own: the extractors log these and
/// treat the engine's contribution as empty.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not open or parse the document.
    #[error("{engine}: cannot open '{path}': {detail}")]
    Open {
        engine: &'static str,
        path: PathBuf,
        detail: String,
    },

    /// A single page could not be read, rendered or recognized.
    #[error("{engine}: page {page} failed: {detail}")]
    Page {
        engine: &'static str,
        page: usize,
        detail: String,
    },

    /// An external OCR tool exited unsuccessfully or could not be spawned.
    #[error("{engine}: command `{command}` failed: {detail}")]
    Command {
        engine: &'static str,
        command: String,
        detail: String,
    },

    /// The engine produced output that could not be interpreted.
    #[error("{engine}: unreadable output: {detail}")]
    Output {
        engine: &'static str,
        detail: String,
    },

    /// The capability was disabled at startup.
    #[error("{engine} is unavailable: {reason}")]
    Unavailable { engine: String, reason: String },
}

/// A single language-model call failed.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored record {id} is corrupt: {detail}")]
    Corrupt { id: DocumentId, detail: String },

    #[error("Store task panicked: {0}")]
    Task(String),
}

/// All errors that end a pipeline run.
///
/// [`PipelineError::kind`] and [`PipelineError::stage`] give the structured
/// view that callers and the document record rely on; the `Display` text is
/// the human-readable message stored next to them.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Resolve ───────────────────────────────────────────────────────────
    /// The source could not be turned into a readable local PDF.
    #[error(transparent)]
    Input(#[from] InputError),

    // ── Extract ───────────────────────────────────────────────────────────
    /// Neither extraction path produced enough text to continue.
    #[error(
        "No meaningful text extracted from the PDF \
         ({chars} characters via {method}, need more than {threshold})"
    )]
    ExtractionEmpty {
        method: ExtractionMethod,
        chars: usize,
        threshold: usize,
    },

    /// An engine failure that could not be absorbed by the fallback policy.
    #[error(transparent)]
    Engine(#[from] EngineError),

    // ── Structure ─────────────────────────────────────────────────────────
    /// Text handed to the structurer was below the minimum length.
    #[error("Insufficient text for structuring: {chars} characters, need at least {min}")]
    InputTooShort { chars: usize, min: usize },

    /// The language model could not be configured.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every model call attempt failed.
    #[error("LLM call failed after {attempts} attempt(s): {detail}")]
    ModelCall { attempts: u32, detail: String },

    /// The last model call attempt exceeded the per-call timeout.
    #[error("LLM call timed out after {secs}s ({attempts} attempt(s))")]
    ModelTimeout { attempts: u32, secs: u64 },

    // ── Validate ──────────────────────────────────────────────────────────
    /// The model answered, but not with a JSON document.
    #[error("LLM returned invalid JSON: {source}")]
    ModelOutputParse {
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, runtime failure).
    #[error("Internal error at {stage}: {detail}")]
    Internal { stage: Stage, detail: String },
}

impl PipelineError {
    /// The persisted failure category for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::ExtractionEmpty { .. } => FailureKind::ExtractionEmpty,
            PipelineError::InputTooShort { .. } => FailureKind::InputTooShort,
            PipelineError::ModelCall { .. } | PipelineError::ProviderNotConfigured { .. } => {
                FailureKind::ModelCall
            }
            PipelineError::ModelTimeout { .. } => FailureKind::ModelTimeout,
            PipelineError::ModelOutputParse { .. } => FailureKind::ModelOutputParse,
            PipelineError::Input(_)
            | PipelineError::Engine(_)
            | PipelineError::InvalidConfig(_)
            | PipelineError::Internal { .. } => FailureKind::Unexpected,
        }
    }

    /// The stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Input(_) | PipelineError::InvalidConfig(_) => Stage::Resolve,
            PipelineError::ExtractionEmpty { .. } | PipelineError::Engine(_) => Stage::Extract,
            PipelineError::InputTooShort { .. }
            | PipelineError::ProviderNotConfigured { .. }
            | PipelineError::ModelCall { .. }
            | PipelineError::ModelTimeout { .. } => Stage::Structure,
            PipelineError::ModelOutputParse { .. } => Stage::Validate,
            PipelineError::Internal { stage, .. } => *stage,
        }
    }

    pub(crate) fn internal(stage: Stage, detail: impl fmt::Display) -> Self {
        PipelineError::Internal {
            stage,
            detail: detail.to_string(),
        }
    }
}

/// Errors from document-level operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The upload was refused before a record was created.
    #[error("{0}")]
    InvalidUpload(String),

    /// No record exists for this id.
    #[error("Document {0} not found")]
    NotFound(DocumentId),

    /// Another run already holds this document.
    #[error("Document {0} is already being processed")]
    RunInProgress(DocumentId),

    /// The run failed; the failure has been recorded on the document.
    #[error("Document {id} failed at {stage}: {source}", stage = .source.stage())]
    Pipeline {
        id: DocumentId,
        #[source]
        source: PipelineError,
    },

    /// The record store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}
