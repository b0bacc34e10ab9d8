//! Per-page extraction results and the text blob assembled from them.

use crate::pipeline::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A table recovered from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableBlock {
    /// Rows of cells from a text-layer engine.
    Grid(Vec<Vec<String>>),
    /// Structure-OCR table markup (HTML), kept as produced.
    Markup(String),
}

impl TableBlock {
    /// Render the table for the text blob, or `None` if it has no content.
    ///
    /// A grid survives only if some cell is non-empty; empty rows are
    /// dropped and cells are joined with `" | "`.
    pub fn render(&self) -> Option<String> {
        match self {
            TableBlock::Grid(rows) => {
                let has_content = rows.iter().flatten().any(|cell| !cell.is_empty());
                if !has_content {
                    return None;
                }
                let lines: Vec<String> = rows
                    .iter()
                    .filter(|row| row.iter().any(|cell| !cell.is_empty()))
                    .map(|row| row.join(" | "))
                    .collect();
                Some(lines.join("\n"))
            }
            TableBlock::Markup(html) => {
                if html.trim().is_empty() {
                    None
                } else {
                    Some(html.clone())
                }
            }
        }
    }
}

/// Text and tables recovered from one page (1-based `page`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageExtraction {
    pub page: usize,
    pub text: String,
    pub tables: Vec<TableBlock>,
}

impl PageExtraction {
    pub fn new(page: usize, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: TableBlock) -> Self {
        self.tables.push(table);
        self
    }

    /// Characters of real content: normalized text plus rendered tables.
    pub fn content_chars(&self) -> usize {
        let text = normalize(&self.text).chars().count();
        let tables: usize = self
            .tables
            .iter()
            .filter_map(TableBlock::render)
            .map(|t| normalize(&t).chars().count())
            .sum();
        text + tables
    }
}

/// Union of per-page results from several engines, keyed by page number.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    pages: BTreeMap<usize, PageExtraction>,
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one engine's pages in. Text for a page that already has text is
    /// appended after a newline; tables accumulate.
    pub fn merge(&mut self, pages: Vec<PageExtraction>) {
        for incoming in pages {
            let entry = self
                .pages
                .entry(incoming.page)
                .or_insert_with(|| PageExtraction::new(incoming.page, ""));
            let text = incoming.text.trim();
            if !text.is_empty() {
                if entry.text.is_empty() {
                    entry.text = text.to_string();
                } else {
                    entry.text = format!("{}\n{}", entry.text, text);
                }
            }
            entry.tables.extend(incoming.tables);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn into_pages(self) -> Vec<PageExtraction> {
        self.pages.into_values().collect()
    }
}

/// Which path produced an [`Extraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Digital,
    RasterOcr,
    StructureOcr,
    /// No strategy produced usable content.
    None,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::Digital => "digital text layer",
            ExtractionMethod::RasterOcr => "raster OCR",
            ExtractionMethod::StructureOcr => "structure OCR",
            ExtractionMethod::None => "no extraction method",
        };
        f.write_str(s)
    }
}

/// The formatted text blob handed on to normalization and structuring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
    pub page_count: usize,
    /// Characters of page content, excluding headers and placeholders.
    pub content_chars: usize,
}

impl Extraction {
    pub fn empty(method: ExtractionMethod) -> Self {
        Self {
            text: String::new(),
            method,
            page_count: 0,
            content_chars: 0,
        }
    }

    /// Format `pages` (already in ascending order) into a text blob.
    ///
    /// Each page gets a `=== Page N ===` header, a `[Text]` block when it
    /// has text and one `[Table K]` block per non-empty table. When
    /// `placeholder` is set, pages without text show it instead.
    pub fn from_pages(
        pages: &[PageExtraction],
        method: ExtractionMethod,
        placeholder: Option<&str>,
    ) -> Self {
        let mut sections = Vec::with_capacity(pages.len());
        let mut content_chars = 0;

        for page in pages {
            let mut section = format!("\n=== Page {} ===\n", page.page);
            let text = normalize(&page.text);
            if !text.is_empty() {
                section.push_str(&format!("[Text]\n{text}\n"));
            } else if let Some(placeholder) = placeholder {
                section.push_str(&format!("{placeholder}\n"));
            }
            let mut table_no = 0;
            for table in &page.tables {
                if let Some(rendered) = table.render() {
                    table_no += 1;
                    section.push_str(&format!("\n[Table {table_no}]\n{rendered}\n"));
                }
            }
            content_chars += page.content_chars();
            sections.push(section);
        }

        Self {
            text: sections.concat().trim().to_string(),
            method,
            page_count: pages.len(),
            content_chars,
        }
    }

    /// Whether this extraction carries more than `threshold` characters of
    /// content.
    pub fn is_meaningful(&self, threshold: usize) -> bool {
        self.content_chars > threshold
    }
}
