//! Document lifecycle: ingestion, runs and their recorded outcome.
//!
//! ```text
//!   ingest ──▶ processing ──run──▶ completed
//!                   ▲        └───▶ failed
//!                   └── reprocess ──┘ (completed only with force)
//! ```
//!
//! Every run goes through [`DocumentLifecycle::run`], whether it was started
//! synchronously ([`DocumentLifecycle::process`]) or on a background task
//! ([`DocumentLifecycle::spawn_process`]). A run holds a [`RunLease`] on its
//! document for its whole duration; a second trigger for the same document
//! is refused with [`LifecycleError::RunInProgress`] and leaves the record
//! alone.

use crate::document::{Document, DocumentId};
use crate::error::LifecycleError;
use crate::extract::Pipeline;
use crate::pipeline::input::is_url;
use crate::store::RecordStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

// ── Leases ───────────────────────────────────────────────────────────────

/// The set of documents with a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunLeases {
    active: Arc<Mutex<HashSet<DocumentId>>>,
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, or `None` if a run already holds it.
    pub fn try_acquire(&self, id: DocumentId) -> Option<RunLease> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(id) {
            return None;
        }
        Some(RunLease {
            id,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_running(&self, id: DocumentId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }
}

/// Exclusive claim on one document. Released on drop.
#[derive(Debug)]
pub struct RunLease {
    id: DocumentId,
    active: Arc<Mutex<HashSet<DocumentId>>>,
}

impl RunLease {
    pub fn id(&self) -> DocumentId {
        self.id
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

/// Outcome of [`DocumentLifecycle::reprocess`].
#[derive(Debug)]
pub enum Reprocess {
    /// The document was already completed and `force` was not set.
    AlreadyCompleted(Document),
    /// A new run finished successfully.
    Finished(Document),
}

pub struct DocumentLifecycle {
    store: Arc<dyn RecordStore>,
    pipeline: Arc<Pipeline>,
    leases: RunLeases,
}

impl DocumentLifecycle {
    pub fn new(store: Arc<dyn RecordStore>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            store,
            pipeline,
            leases: RunLeases::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn leases(&self) -> &RunLeases {
        &self.leases
    }

    /// Accept an upload and create its record in `processing`.
    pub async fn ingest(&self, filename: &str, source: &str) -> Result<Document, LifecycleError> {
        validate_upload(filename, source).await?;
        let doc = self.store.create(filename.trim(), source.trim()).await?;
        info!("Document {}: ingested '{}' from {}", doc.id, doc.filename, doc.source);
        Ok(doc)
    }

    /// Run the pipeline for `id` and wait for the outcome.
    ///
    /// The outcome is committed before this returns; on failure the error is
    /// returned as [`LifecycleError::Pipeline`] after being recorded.
    pub async fn process(&self, id: DocumentId) -> Result<Document, LifecycleError> {
        let lease = self.acquire(id)?;
        self.run(lease).await
    }

    /// Start a run for `id` on a background task.
    ///
    /// The lease is taken before this returns, so a concurrent trigger is
    /// refused immediately. Callers may await the handle or poll the store.
    pub fn spawn_process(
        self: &Arc<Self>,
        id: DocumentId,
    ) -> Result<JoinHandle<Result<Document, LifecycleError>>, LifecycleError> {
        let lease = self.acquire(id)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run(lease).await }))
    }

    /// Re-run a document. A completed document is only re-run with `force`.
    pub async fn reprocess(&self, id: DocumentId, force: bool) -> Result<Reprocess, LifecycleError> {
        let lease = self.acquire(id)?;
        let doc = self.load(id).await?;
        if doc.is_completed() && !force {
            info!("Document {}: already completed, not reprocessing", id);
            return Ok(Reprocess::AlreadyCompleted(doc));
        }
        self.run(lease).await.map(Reprocess::Finished)
    }

    pub async fn get(&self, id: DocumentId) -> Result<Document, LifecycleError> {
        self.load(id).await
    }

    fn acquire(&self, id: DocumentId) -> Result<RunLease, LifecycleError> {
        self.leases.try_acquire(id).ok_or_else(|| {
            warn!("Document {}: run already in progress", id);
            LifecycleError::RunInProgress(id)
        })
    }

    async fn load(&self, id: DocumentId) -> Result<Document, LifecycleError> {
        self.store
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// One run: `processing`, then the pipeline, then the committed outcome.
    async fn run(&self, lease: RunLease) -> Result<Document, LifecycleError> {
        let id = lease.id();
        let mut doc = self.load(id).await?;

        doc.begin_run();
        self.store.save(&doc).await?;
        info!("Document {}: processing '{}'", id, doc.filename);

        match self.pipeline.run(&doc.source).await {
            Ok(output) => {
                doc.complete(output.data);
                self.store.save(&doc).await?;
                info!(
                    "Document {}: completed via {} ({}ms)",
                    id, output.method, output.stats.total_duration_ms
                );
                Ok(doc)
            }
            Err(e) => {
                error!("Document {}: failed at {}: {}", id, e.stage(), e);
                doc.fail(&e);
                self.store.save(&doc).await?;
                Err(LifecycleError::Pipeline { id, source: e })
            }
        }
    }
}

/// Check an upload before a record is created.
///
/// Only `.pdf` filenames are accepted. The source must be non-empty and,
/// when it is a local path, must not point at an empty file.
pub async fn validate_upload(filename: &str, source: &str) -> Result<(), LifecycleError> {
    let filename = filename.trim();
    if !has_pdf_extension(filename) {
        return Err(LifecycleError::InvalidUpload(format!(
            "Only PDF files are accepted, got '{filename}'"
        )));
    }
    let source = source.trim();
    if source.is_empty() {
        return Err(LifecycleError::InvalidUpload(
            "Document source must not be empty".to_string(),
        ));
    }
    if !is_url(source) {
        if let Ok(meta) = tokio::fs::metadata(source).await {
            if meta.len() == 0 {
                return Err(LifecycleError::InvalidUpload(format!(
                    "Uploaded file '{filename}' is empty"
                )));
            }
        }
    }
    Ok(())
}

fn has_pdf_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let leases = RunLeases::new();
        let first = leases.try_acquire(DocumentId(1)).unwrap();
        assert!(leases.try_acquire(DocumentId(1)).is_none());
        assert!(leases.try_acquire(DocumentId(2)).is_some());
        assert!(leases.is_running(DocumentId(1)));
        drop(first);
        assert!(!leases.is_running(DocumentId(1)));
        assert!(leases.try_acquire(DocumentId(1)).is_some());
    }

    #[test]
    fn pdf_extension_check() {
        assert!(has_pdf_extension("invoice.pdf"));
        assert!(has_pdf_extension("SCAN.PDF"));
        assert!(!has_pdf_extension("invoice.docx"));
        assert!(!has_pdf_extension("pdf"));
        assert!(!has_pdf_extension(""));
    }

    #[tokio::test]
    async fn upload_validation() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        let empty = empty.to_str().unwrap();

        assert!(validate_upload("a.pdf", "https://x.test/a.pdf").await.is_ok());
        assert!(matches!(
            validate_upload("a.txt", "https://x.test/a.txt").await,
            Err(LifecycleError::InvalidUpload(_))
        ));
        assert!(matches!(
            validate_upload("a.pdf", "   ").await,
            Err(LifecycleError::InvalidUpload(_))
        ));
        assert!(matches!(
            validate_upload("empty.pdf", empty).await,
            Err(LifecycleError::InvalidUpload(msg)) if msg.contains("empty")
        ));
    }
}
