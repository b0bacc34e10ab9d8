//! Layout-aware OCR through the PaddleOCR `pp_structurev3` pipeline.
//!
//! The CLI is run once per document with a scoped output directory; it
//! writes one `*_res.json` per page. From each we keep the recognized text
//! lines (`overall_ocr_res.rec_texts`) and the HTML of every detected table
//! (`table_res_list[].pred_html`).

use super::LayoutOcrEngine;
use crate::error::EngineError;
use crate::pipeline::pages::{PageExtraction, TableBlock};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

const ENGINE: &str = "pp-structure";

#[derive(Debug, Clone)]
pub struct PaddleStructureEngine {
    command: String,
}

impl PaddleStructureEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageResult {
    #[serde(default)]
    page_index: Option<usize>,
    #[serde(default)]
    overall_ocr_res: OcrResult,
    #[serde(default)]
    table_res_list: Vec<TableResult>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrResult {
    #[serde(default)]
    rec_texts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableResult {
    #[serde(default)]
    pred_html: String,
}

impl LayoutOcrEngine for PaddleStructureEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn analyze(&self, path: &Path) -> Result<Vec<PageExtraction>, EngineError> {
        let command_err = |detail: String| EngineError::Command {
            engine: ENGINE,
            command: format!("{} pp_structurev3", self.command),
            detail,
        };

        let out_dir = tempfile::Builder::new()
            .prefix("pdf2expense-structure-")
            .tempdir()
            .map_err(|e| command_err(format!("temp dir: {e}")))?;

        let output = Command::new(&self.command)
            .arg("pp_structurev3")
            .arg("--input")
            .arg(path)
            .arg("--save_path")
            .arg(out_dir.path())
            .output()
            .map_err(|e| command_err(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(command_err(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut files = json_files(out_dir.path()).map_err(|e| EngineError::Output {
            engine: ENGINE,
            detail: e.to_string(),
        })?;
        files.sort();

        let mut results = Vec::with_capacity(files.len());
        for (order, file) in files.iter().enumerate() {
            let raw = std::fs::read_to_string(file).map_err(|e| EngineError::Output {
                engine: ENGINE,
                detail: format!("{}: {e}", file.display()),
            })?;
            match parse_page_result(&raw) {
                Ok(page) => results.push((page.page_index.unwrap_or(order), page)),
                Err(e) => warn!("pp-structure: skipping {}: {}", file.display(), e),
            }
        }
        debug!("pp-structure: {} page result(s)", results.len());
        Ok(into_pages(results))
    }
}

/// Parse one saved page result. Some PaddleOCR versions wrap the payload in
/// a top-level `res` object.
fn parse_page_result(raw: &str) -> Result<PageResult, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value.get("res") {
        Some(inner) if inner.is_object() => serde_json::from_value(inner.clone()),
        _ => serde_json::from_value(value),
    }
}

fn into_pages(mut results: Vec<(usize, PageResult)>) -> Vec<PageExtraction> {
    results.sort_by_key(|(index, _)| *index);
    results
        .into_iter()
        .map(|(index, page)| {
            let mut extraction =
                PageExtraction::new(index + 1, page.overall_ocr_res.rec_texts.join("\n"));
            extraction.tables = page
                .table_res_list
                .into_iter()
                .filter(|t| !t.pred_html.trim().is_empty())
                .map(|t| TableBlock::Markup(t.pred_html))
                .collect();
            extraction
        })
        .collect()
}

fn json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(json_files(&path)?);
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}
