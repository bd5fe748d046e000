use super::error::{LoadError, LoadResult};
use super::sheet_loader::{RawSheet, SheetLoader};
use crate::models::Month;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One monthly export together with the month it belongs to.
#[derive(Debug, Clone)]
pub struct MonthlyTable {
    pub month: Month,
    pub path: PathBuf,
    pub sheet: RawSheet,
}

pub struct MonthlyLoader {
    loader: SheetLoader,
}

impl MonthlyLoader {
    pub fn new() -> Self {
        MonthlyLoader {
            loader: SheetLoader::new(),
        }
    }

    /// Read every monthly file in the given order. All paths are checked before
    /// any file is parsed so a missing month aborts the run up front.
    pub fn load_all(&self, sources: &[(PathBuf, Month)]) -> LoadResult<Vec<MonthlyTable>> {
        if let Some((missing, _)) = sources.iter().find(|(path, _)| !path.exists()) {
            return Err(LoadError::MissingInput(missing.clone()));
        }

        let mut tables = Vec::with_capacity(sources.len());
        for (path, month) in sources {
            let sheet = self.loader.load(path)?;
            info!(
                "File elaborato: {} ({} righe) -> {}",
                path.display(),
                sheet.height(),
                month
            );
            tables.push(MonthlyTable {
                month: *month,
                path: path.clone(),
                sheet,
            });
        }

        Ok(tables)
    }

    /// Read every supported spreadsheet in a folder, sorted by file name.
    pub fn load_folder(&self, dir: &Path) -> LoadResult<Vec<RawSheet>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && SheetLoader::is_supported(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            warn!("No spreadsheets found in {}", dir.display());
        }

        paths.iter().map(|path| self.loader.load(path)).collect()
    }
}

impl Default for MonthlyLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_all_keeps_caller_order() {
        let dir = TempDir::new().unwrap();
        let feb = dir.path().join("feb.csv");
        let jan = dir.path().join("jan.csv");
        fs::write(&feb, "code,stock\nB1,2\n").unwrap();
        fs::write(&jan, "code,stock\nA1,1\nA2,3\n").unwrap();

        let tables = MonthlyLoader::new()
            .load_all(&[(feb.clone(), Month::Febbraio), (jan.clone(), Month::Gennaio)])
            .unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].month, Month::Febbraio);
        assert_eq!(tables[0].sheet.height(), 1);
        assert_eq!(tables[1].month, Month::Gennaio);
        assert_eq!(tables[1].sheet.height(), 2);
    }

    #[test]
    fn test_load_all_fails_on_missing_month() {
        let dir = TempDir::new().unwrap();
        let jan = dir.path().join("jan.csv");
        fs::write(&jan, "code\nA1\n").unwrap();
        let missing = dir.path().join("feb.csv");

        let err = MonthlyLoader::new()
            .load_all(&[(jan, Month::Gennaio), (missing.clone(), Month::Febbraio)])
            .unwrap_err();

        match err {
            LoadError::MissingInput(path) => assert_eq!(path, missing),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_folder_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.csv"), "x\n1\n2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sheets = MonthlyLoader::new().load_folder(dir.path()).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(sheets[0].height(), 2);
    }
}
