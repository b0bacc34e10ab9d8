//! Table detection from positioned text runs.
//!
//! Text-layer engines hand over every run of text with its bounding box.
//! Runs are grouped into visual rows by their vertical position, rows are
//! split into cells at wide horizontal gaps, and a stretch of consecutive
//! multi-cell rows whose cell edges line up is emitted as a grid.
//!
//! Coordinates are PDF user space: `y` grows upwards, so rows are ordered by
//! descending `y`.

use crate::pipeline::pages::TableBlock;
use std::cmp::Ordering;

/// Same-row tolerance for vertical positions, in points.
const ROW_TOLERANCE: f32 = 10.0;
/// Horizontal gap that separates two cells, in points.
const CELL_GAP: f32 = 12.0;
/// Two cell edges within this distance belong to the same column.
const COLUMN_TOLERANCE: f32 = 20.0;
/// Share of a row's cells that must line up with the previous row.
const MIN_ALIGNMENT: f32 = 0.5;

/// A run of text with its horizontal extent and vertical position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub y: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, left: f32, right: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            left,
            right,
            y,
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    left: f32,
    text: String,
}

/// Detect grid tables among the runs of one page, top to bottom.
pub fn detect_tables(runs: &[TextRun]) -> Vec<TableBlock> {
    let rows: Vec<Vec<Cell>> = group_rows(runs).into_iter().map(split_cells).collect();

    let mut tables = Vec::new();
    let mut region: Vec<&Vec<Cell>> = Vec::new();

    for row in &rows {
        let continues = row.len() >= 2
            && region
                .last()
                .map_or(true, |prev| alignment(prev, row) >= MIN_ALIGNMENT);
        if continues {
            region.push(row);
            continue;
        }
        flush(&mut region, &mut tables);
        if row.len() >= 2 {
            region.push(row);
        }
    }
    flush(&mut region, &mut tables);

    tables
}

fn flush(region: &mut Vec<&Vec<Cell>>, tables: &mut Vec<TableBlock>) {
    if region.len() >= 2 {
        tables.push(build_grid(region));
    }
    region.clear();
}

/// Cluster runs into rows (descending `y`), each row sorted left to right.
fn group_rows(runs: &[TextRun]) -> Vec<Vec<&TextRun>> {
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|r| !r.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal));

    let mut rows: Vec<Vec<&TextRun>> = Vec::new();
    let mut center = f32::NAN;
    for run in sorted {
        if let Some(row) = rows.last_mut().filter(|_| (center - run.y).abs() <= ROW_TOLERANCE) {
            row.push(run);
            center = row.iter().map(|r| r.y).sum::<f32>() / row.len() as f32;
        } else {
            center = run.y;
            rows.push(vec![run]);
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap_or(Ordering::Equal));
    }
    rows
}

fn split_cells(row: Vec<&TextRun>) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();
    let mut last_right = f32::NEG_INFINITY;
    for run in row {
        let text = run.text.trim();
        if let Some(cell) = cells.last_mut().filter(|_| run.left - last_right < CELL_GAP) {
            cell.text.push(' ');
            cell.text.push_str(text);
        } else {
            cells.push(Cell {
                left: run.left,
                text: text.to_string(),
            });
        }
        last_right = last_right.max(run.right);
    }
    cells
}

/// Fraction of `row`'s cells whose left edge matches a cell in `prev`.
fn alignment(prev: &[Cell], row: &[Cell]) -> f32 {
    let matched = row
        .iter()
        .filter(|c| prev.iter().any(|p| (p.left - c.left).abs() < COLUMN_TOLERANCE))
        .count();
    matched as f32 / row.len().max(prev.len()) as f32
}

fn build_grid(region: &[&Vec<Cell>]) -> TableBlock {
    let mut edges: Vec<f32> = region.iter().flat_map(|r| r.iter().map(|c| c.left)).collect();
    edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut columns: Vec<f32> = Vec::new();
    for x in edges {
        match columns.last() {
            Some(&col) if x - col < COLUMN_TOLERANCE => {}
            _ => columns.push(x),
        }
    }

    let grid = region
        .iter()
        .map(|row| {
            let mut cells = vec![String::new(); columns.len()];
            for cell in row.iter() {
                let idx = nearest_column(&columns, cell.left);
                if cells[idx].is_empty() {
                    cells[idx] = cell.text.clone();
                } else {
                    cells[idx] = format!("{} {}", cells[idx], cell.text);
                }
            }
            cells
        })
        .collect();

    TableBlock::Grid(grid)
}

fn nearest_column(columns: &[f32], x: f32) -> usize {
    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (x - **a)
                .abs()
                .partial_cmp(&(x - **b).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}
