use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a run while reading spreadsheets.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("File non trovato: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Unsupported file format '{extension}' for {} (expected .xlsx/.xlsm/.xls/.ods/.csv)", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Workbook {} has no worksheets", .0.display())]
    EmptyWorkbook(PathBuf),

    #[error("Failed to read spreadsheet {}: {message}", .path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("Failed to read CSV {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;
