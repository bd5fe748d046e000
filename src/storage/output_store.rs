use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Local output folder. Every file written through the store is remembered
/// so the run can report what it produced.
pub struct OutputStore {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl OutputStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        OutputStore {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            info!("Output folder '{}' already exists", self.dir.display());
        } else {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create output folder {}", self.dir.display()))?;
            info!("Created output folder: {}", self.dir.display());
        }
        Ok(())
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    fn record(&mut self, path: PathBuf) -> PathBuf {
        if !self.written.contains(&path) {
            self.written.push(path.clone());
        }
        path
    }

    pub fn store_csv(&mut self, file_name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let path = self.path(file_name);
        let mut file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .with_context(|| format!("Failed to write CSV {}", path.display()))?;

        info!("Stored CSV file: {} ({} rows)", path.display(), df.height());
        Ok(self.record(path))
    }

    pub fn store_parquet(&mut self, file_name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let path = self.path(file_name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        ParquetWriter::new(file)
            .finish(df)
            .with_context(|| format!("Failed to write Parquet {}", path.display()))?;

        info!("Stored Parquet file: {} ({} rows)", path.display(), df.height());
        Ok(self.record(path))
    }

    pub fn store_text(&mut self, file_name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path(file_name);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Stored file: {}", path.display());
        Ok(self.record(path))
    }

    /// Read back a Parquet file previously written to this folder.
    pub fn load_parquet(&self, file_name: &str) -> Result<DataFrame> {
        let path = self.path(file_name);
        let file = File::open(&path).with_context(|| {
            format!(
                "Dataset not found: {} (run the quality stage first)",
                path.display()
            )
        })?;

        let df = ParquetReader::new(file)
            .finish()
            .with_context(|| format!("Failed to read Parquet {}", path.display()))?;
        info!("Loaded {} rows from {}", df.height(), path.display());
        Ok(df)
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}
