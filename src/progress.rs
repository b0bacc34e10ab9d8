//! Progress-callback trait for stage-level pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow a
//! run as it moves through classification, extraction and structuring. The
//! binary uses it to drive its spinner; a service could forward the events
//! to a channel or a log sink.
//!
//! # Example
//!
//! ```rust
//! use pdf2expense::{ExtractionConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, _stage: Stage, _detail: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(StageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline as each stage starts and finishes.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Runs for different documents may report
/// concurrently.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the source has been resolved to a local file.
    fn on_run_start(&self, source: &str) {
        let _ = source;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// `detail` is a short human-readable summary, e.g. `"scanned, 2 pages"`.
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called once per run, after success or failure.
    ///
    /// # Arguments
    /// * `error`: `None` on success, the failure message otherwise
    fn on_run_complete(&self, error: Option<&str>) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, detail: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {stage}: {detail}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start("a.pdf");
        cb.on_stage_start(Stage::Classify);
        cb.on_stage_complete(Stage::Classify, "digital");
        cb.on_run_complete(Some("boom"));
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb: Arc<dyn PipelineProgressCallback> = Arc::new(Recorder::default());
        cb.on_stage_start(Stage::Extract);
        cb.on_stage_complete(Stage::Extract, "raster OCR, 3 pages");
        cb.on_run_complete(None);

        let recorder = Recorder::default();
        recorder.on_stage_start(Stage::Structure);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["start structure"]);
    }
}
