use super::error::{LoadError, LoadResult};
use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// A single spreadsheet cell. Workbooks carry typed cells; CSV fields are
/// always text.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text rendering used when the sheet is turned into string columns.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(value) => Some(render_number(*value)),
            Cell::Text(text) => Some(text.clone()),
            Cell::Bool(flag) => Some(flag.to_string()),
        }
    }

    fn from_workbook(data: &Data) -> Cell {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(value) => Cell::Number(*value as f64),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(flag) => Cell::Bool(*flag),
            Data::String(text) if text.is_empty() => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            // Excel error cells (#N/A, #DIV/0!, ...) carry no value
            Data::Error(_) => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }

    /// Codes like "007" or "12E5" must reach the normalizer untouched, so
    /// numeric coercion is left to the quantity columns.
    fn from_csv_field(field: &str) -> Cell {
        if field.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(field.to_string())
        }
    }
}

/// Whole numbers are written without a fractional part so that codes stored
/// as numbers keep their digits ("1234" rather than "1234.0").
fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// First worksheet of a file: a header row plus the non-blank data rows.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn from_grid<I>(name: &str, header: &[Cell], data_rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Cell>>,
    {
        let headers = unique_headers(header);
        let width = headers.len();

        let rows = data_rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();

        RawSheet {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    /// Every column becomes a nullable string column; typing happens later in
    /// the field normalizer.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let values: Vec<Option<String>> = self.column(idx).map(Cell::as_text).collect();
                Series::new(header.as_str().into(), values).into()
            })
            .collect();

        DataFrame::new(columns)
    }
}

/// Blank headers become `Unnamed: <idx>` and repeated headers get a `.N`
/// suffix, so that every column name is unique.
fn unique_headers(header: &[Cell]) -> Vec<String> {
    let mut used = HashSet::new();
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = cell
                .as_text()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| format!("Unnamed: {}", idx));

            let mut candidate = base.clone();
            let mut suffix = 1;
            while used.contains(&candidate) {
                candidate = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

pub struct SheetLoader;

impl SheetLoader {
    pub fn new() -> Self {
        SheetLoader
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> LoadResult<RawSheet> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::MissingInput(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let sheet = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => self.load_workbook(path)?,
            "csv" => self.load_csv(path)?,
            _ => {
                return Err(LoadError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension,
                });
            }
        };

        debug!(
            "Loaded {} with {} columns and {} rows",
            path.display(),
            sheet.headers.len(),
            sheet.height()
        );
        Ok(sheet)
    }

    /// Whether the file has an extension this loader can read.
    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                matches!(
                    e.to_lowercase().as_str(),
                    "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" | "csv"
                )
            })
            .unwrap_or(false)
    }

    fn load_workbook(&self, path: &Path) -> LoadResult<RawSheet> {
        let spreadsheet_error = |message: String| LoadError::Spreadsheet {
            path: path.to_path_buf(),
            message,
        };

        let mut workbook =
            open_workbook_auto(path).map_err(|e| spreadsheet_error(e.to_string()))?;

        let sheet_names = workbook.sheet_names();
        let first_sheet = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| LoadError::EmptyWorkbook(path.to_path_buf()))?;

        let range = workbook
            .worksheet_range(&first_sheet)
            .map_err(|e| spreadsheet_error(e.to_string()))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from_workbook).collect::<Vec<_>>());
        let header = rows.next().unwrap_or_default();

        Ok(RawSheet::from_grid(&sheet_stem(path), &header, rows))
    }

    fn load_csv(&self, path: &Path) -> LoadResult<RawSheet> {
        let csv_error = |source: csv::Error| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_error)?;

        let header: Vec<Cell> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| Cell::Text(h.to_string()))
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(Cell::from_csv_field).collect::<Vec<_>>());
        }

        Ok(RawSheet::from_grid(&sheet_stem(path), &header, rows))
    }
}

impl Default for SheetLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn sheet_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
