//! Text-layer extraction for digitally authored PDFs.

use crate::engines::{Capability, TextLayerEngine};
use crate::pipeline::pages::{Extraction, ExtractionMethod, PageMap};
use std::path::Path;
use tracing::{debug, warn};

/// Run every text-layer engine in order and merge their pages.
///
/// Pages are the union across engines, ascending. An engine that is
/// unavailable or fails on the document contributes nothing.
pub fn extract_digital(engines: &[Capability<dyn TextLayerEngine>], path: &Path) -> Extraction {
    let mut merged = PageMap::new();

    for capability in engines {
        let engine = match capability.get() {
            Ok(engine) => engine,
            Err(e) => {
                debug!("Digital extraction: skipping engine: {}", e);
                continue;
            }
        };
        match engine.extract_pages(path) {
            Ok(pages) => {
                debug!("{}: {} page(s)", engine.name(), pages.len());
                merged.merge(pages);
            }
            Err(e) => warn!("Digital extraction: {}", e),
        }
    }

    let pages = merged.into_pages();
    Extraction::from_pages(&pages, ExtractionMethod::Digital, None)
}
