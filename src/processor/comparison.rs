use super::field_normalizer::to_num;
use crate::loader::{Cell, MonthlyLoader, RawSheet};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Shape and defect counts of one spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStats {
    pub rows: u64,
    pub null_cells: u64,
    pub duplicate_rows: u64,
    pub negative_cells: u64,
}

/// Numeric value of a cell; text goes through the same lenient parsing as
/// the quantity columns.
fn cell_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(value) => Some(*value),
        Cell::Text(text) => to_num(text),
        Cell::Bool(_) | Cell::Empty => None,
    }
}

/// A column is numeric when it has at least one value and every non-empty
/// cell reads as a number.
fn is_numeric_column(sheet: &RawSheet, idx: usize) -> bool {
    let mut values = sheet.column(idx).filter(|cell| !cell.is_empty()).peekable();
    values.peek().is_some() && values.all(|cell| cell_number(cell).is_some())
}

pub fn file_stats(sheet: &RawSheet) -> FileStats {
    let null_cells = sheet
        .rows
        .iter()
        .flatten()
        .filter(|cell| cell.is_empty())
        .count();

    let mut seen = HashSet::with_capacity(sheet.height());
    let duplicate_rows = sheet
        .rows
        .iter()
        .filter(|row| !seen.insert(format!("{:?}", row)))
        .count();

    let negative_cells: usize = (0..sheet.headers.len())
        .filter(|idx| is_numeric_column(sheet, *idx))
        .map(|idx| {
            sheet
                .column(idx)
                .filter(|cell| cell_number(cell).is_some_and(|v| v < 0.0))
                .count()
        })
        .sum();

    FileStats {
        rows: sheet.height() as u64,
        null_cells: null_cells as u64,
        duplicate_rows: duplicate_rows as u64,
        negative_cells: negative_cells as u64,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub file: String,
    pub raw: FileStats,
    pub clean: FileStats,
}

/// Outer join on the file stem, sorted by stem. A file missing on one side
/// reads as all zeros there.
pub fn compare(raw: &[(String, FileStats)], clean: &[(String, FileStats)]) -> Vec<ComparisonRow> {
    let mut joined: BTreeMap<&str, ComparisonRow> = BTreeMap::new();

    for (file, stats) in raw {
        joined
            .entry(file.as_str())
            .or_insert_with(|| empty_row(file))
            .raw = stats.clone();
    }
    for (file, stats) in clean {
        joined
            .entry(file.as_str())
            .or_insert_with(|| empty_row(file))
            .clean = stats.clone();
    }

    joined.into_values().collect()
}

fn empty_row(file: &str) -> ComparisonRow {
    ComparisonRow {
        file: file.to_string(),
        raw: FileStats::default(),
        clean: FileStats::default(),
    }
}

pub struct FileComparison {
    loader: MonthlyLoader,
}

impl FileComparison {
    pub fn new() -> Self {
        FileComparison {
            loader: MonthlyLoader::new(),
        }
    }

    fn folder_stats(&self, dir: &Path) -> Result<Vec<(String, FileStats)>> {
        let sheets = self
            .loader
            .load_folder(dir)
            .with_context(|| format!("Failed to read spreadsheets in {}", dir.display()))?;

        Ok(sheets
            .iter()
            .map(|sheet| (sheet.name.clone(), file_stats(sheet)))
            .collect())
    }

    /// Compare the raw folder (optional) against the cleaned one. Without raw
    /// files the raw side is all zeros.
    pub fn run(&self, raw_dir: Option<&Path>, clean_dir: &Path) -> Result<Vec<ComparisonRow>> {
        let raw = match raw_dir {
            Some(dir) if dir.is_dir() => self.folder_stats(dir)?,
            Some(dir) => {
                warn!("Raw folder {} not found, comparing against zeros", dir.display());
                Vec::new()
            }
            None => Vec::new(),
        };
        let clean = self.folder_stats(clean_dir)?;

        let rows = compare(&raw, &clean);
        info!(
            "Compared {} raw and {} cleaned files ({} rows)",
            raw.len(),
            clean.len(),
            rows.len()
        );
        Ok(rows)
    }
}

impl Default for FileComparison {
    fn default() -> Self {
        Self::new()
    }
}

fn stats_columns(suffix: &str, stats: &[&FileStats]) -> Vec<Column> {
    vec![
        Series::new(
            format!("righe_{}", suffix).into(),
            stats.iter().map(|s| s.rows).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            format!("valori_nulli_{}", suffix).into(),
            stats.iter().map(|s| s.null_cells).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            format!("duplicati_{}", suffix).into(),
            stats.iter().map(|s| s.duplicate_rows).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            format!("negativi_{}", suffix).into(),
            stats.iter().map(|s| s.negative_cells).collect::<Vec<_>>(),
        )
        .into(),
    ]
}

pub fn comparison_frame(rows: &[ComparisonRow]) -> Result<DataFrame> {
    let raw: Vec<&FileStats> = rows.iter().map(|r| &r.raw).collect();
    let clean: Vec<&FileStats> = rows.iter().map(|r| &r.clean).collect();

    let mut columns: Vec<Column> = vec![
        Series::new("file".into(), rows.iter().map(|r| r.file.as_str()).collect::<Vec<_>>()).into(),
    ];
    columns.extend(stats_columns("raw", &raw));
    columns.extend(stats_columns("clean", &clean));

    Ok(DataFrame::new(columns)?)
}
