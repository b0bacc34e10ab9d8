//! Line OCR by shelling out to the `tesseract` CLI.
//!
//! The bitmap is written to a scoped PNG temp file and recognized with the
//! `tsv` output config, which reports one row per word with its block,
//! paragraph and line indices. Words are regrouped into lines in the order
//! tesseract reports them.

use super::{LineOcrEngine, RecognizedLine};
use crate::error::EngineError;
use image::{GrayImage, ImageFormat};
use std::process::Command;
use tracing::debug;

const ENGINE: &str = "tesseract";

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    lang: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }
}

impl LineOcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedLine>, EngineError> {
        let command_err = |detail: String| EngineError::Command {
            engine: ENGINE,
            command: self.command.clone(),
            detail,
        };

        // Dropped (and deleted) when this function returns.
        let png = tempfile::Builder::new()
            .prefix("pdf2expense-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| command_err(format!("temp file: {e}")))?;
        image
            .save_with_format(png.path(), ImageFormat::Png)
            .map_err(|e| command_err(format!("writing bitmap: {e}")))?;

        let output = Command::new(&self.command)
            .arg(png.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("tsv")
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

        let lines = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract: {} line(s) recognized", lines.len());
        Ok(lines)
    }
}

/// Group tesseract TSV word rows into lines, keeping first-seen order.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Only level-5 (word) rows carry text.
pub fn parse_tsv(tsv: &str) -> Vec<RecognizedLine> {
    let mut keys: Vec<(u32, u32, u32, u32)> = Vec::new();
    let mut words: Vec<(Vec<String>, Vec<f32>)> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].replace('\u{0000}', "");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));
        let conf = cols[10].trim().parse::<f32>().unwrap_or(-1.0);

        let idx = match keys.iter().position(|k| *k == key) {
            Some(idx) => idx,
            None => {
                keys.push(key);
                words.push((Vec::new(), Vec::new()));
                keys.len() - 1
            }
        };
        words[idx].0.push(text.to_string());
        if conf >= 0.0 {
            words[idx].1.push(conf);
        }
    }

    words
        .into_iter()
        .map(|(texts, confs)| RecognizedLine {
            text: texts.join(" "),
            confidence: if confs.is_empty() {
                0.0
            } else {
                confs.iter().sum::<f32>() / confs.len() as f32 / 100.0
            },
        })
        .collect()
}
