use super::column_standardizer::ColumnStandardizer;
use super::columns::string_values;
use super::field_normalizer::FieldNormalizer;
use super::quality_metrics::duplicate_mask;
use crate::loader::MonthlyTable;
use crate::models::{CanonicalField, DEDUP_KEY, MONTH_COLUMN, Month};
use anyhow::{Result, anyhow};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::info;

/// The concatenated monthly tables before and after cleaning.
pub struct Integration {
    pub raw: DataFrame,
    pub clean: DataFrame,
}

pub struct Integrator {
    standardizer: ColumnStandardizer,
    normalizer: FieldNormalizer,
}

impl Integrator {
    pub fn new() -> Self {
        Integrator {
            standardizer: ColumnStandardizer::new(),
            normalizer: FieldNormalizer,
        }
    }

    pub fn integrate(&self, tables: &[MonthlyTable]) -> Result<Integration> {
        let mut frames = Vec::with_capacity(tables.len());

        for table in tables {
            let source = table.path.display().to_string();
            let df = table.sheet.to_dataframe()?;
            let standardized = self.standardizer.standardize(&df, &source)?;
            frames.push(self.tag_month(standardized, table.month)?);
        }

        let raw = self.concat(frames)?;
        info!("Integrated {} raw rows from {} monthly tables", raw.height(), tables.len());

        let clean = self.clean(&raw)?;
        info!(
            "Cleaning kept {} of {} rows ({} duplicates removed)",
            clean.height(),
            raw.height(),
            raw.height() - clean.height()
        );

        Ok(Integration { raw, clean })
    }

    pub fn tag_month(&self, mut df: DataFrame, month: Month) -> Result<DataFrame> {
        let labels = vec![month.label(); df.height()];
        df.with_column(Series::new(MONTH_COLUMN.into(), labels))?;
        Ok(df)
    }

    /// Stack the frames in the given order.
    pub fn concat(&self, frames: Vec<DataFrame>) -> Result<DataFrame> {
        let mut iter = frames.into_iter();
        let mut combined = iter
            .next()
            .ok_or_else(|| anyhow!("No monthly tables to integrate"))?;

        for df in iter {
            combined = combined
                .vstack(&df)
                .map_err(|e| anyhow!("Failed to combine monthly tables: {}", e))?;
        }

        Ok(combined)
    }

    /// Normalize codes and units, clamp and zero-fill quantities, then drop
    /// repeated `(code, description, mese_rif)` keys keeping the first row.
    pub fn clean(&self, raw: &DataFrame) -> Result<DataFrame> {
        let mut clean = raw.clone();
        self.normalizer.normalize_dataframe(&mut clean)?;
        self.deduplicate(&clean)
    }

    pub fn deduplicate(&self, df: &DataFrame) -> Result<DataFrame> {
        let keep: Vec<bool> = duplicate_mask(df, &DEDUP_KEY)?
            .into_iter()
            .map(|dup| !dup)
            .collect();
        let keep = BooleanChunked::from_slice("keep".into(), &keep);
        Ok(df.filter(&keep)?)
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows and distinct non-null codes per month, in calendar order. Months with
/// no rows are listed with zeros.
pub fn month_summary(df: &DataFrame) -> Result<DataFrame> {
    let months = string_values(df, MONTH_COLUMN)?;
    let codes = string_values(df, CanonicalField::Code.name())?;

    let mut labels = Vec::with_capacity(Month::ALL.len());
    let mut rows = Vec::with_capacity(Month::ALL.len());
    let mut unique_codes = Vec::with_capacity(Month::ALL.len());

    for month in Month::ALL {
        let mut count = 0u64;
        let mut distinct: HashSet<&str> = HashSet::new();
        for (label, code) in months.iter().zip(codes.iter()) {
            if label.as_deref() == Some(month.label()) {
                count += 1;
                if let Some(code) = code.as_deref() {
                    distinct.insert(code);
                }
            }
        }
        labels.push(month.label());
        rows.push(count);
        unique_codes.push(distinct.len() as u64);
    }

    Ok(DataFrame::new(vec![
        Series::new("mese".into(), labels).into(),
        Series::new("righe".into(), rows).into(),
        Series::new("codici_unici".into(), unique_codes).into(),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Cell, MonthlyLoader, RawSheet};
    use crate::processor::columns::numeric_values;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn monthly(month: Month, header: &[&str], rows: Vec<Vec<Cell>>) -> MonthlyTable {
        let header: Vec<Cell> = header.iter().map(|h| text(h)).collect();
        MonthlyTable {
            month,
            path: PathBuf::from(format!("{}.xlsx", month.label())),
            sheet: RawSheet::from_grid(month.label(), &header, rows),
        }
    }

    fn sample_tables() -> Vec<MonthlyTable> {
        let january = monthly(
            Month::Gennaio,
            &["Codice", "UM", "Giacenza", "Reale", "Scaricare"],
            vec![
                vec![text("ab1"), text("pagina"), Cell::Number(-5.0), Cell::Number(10.0), Cell::Number(3.0)],
                vec![text("AB-1"), text("pagina"), Cell::Number(-5.0), Cell::Number(10.0), Cell::Number(3.0)],
                vec![text("zz9"), Cell::Empty, text("n/d"), Cell::Number(-1.0), Cell::Empty],
            ],
        );
        let february = monthly(
            Month::Febbraio,
            &["item_code", "Description", "unit_of_measure", "stock_quantity", "real_stock", "ship_outgoing"],
            vec![
                vec![text("ab1"), Cell::Empty, text("pages"), Cell::Number(-5.0), Cell::Number(10.0), Cell::Number(3.0)],
                vec![Cell::Empty, text("orphan"), text("pz"), Cell::Number(1.0), Cell::Number(1.0), Cell::Number(1.0)],
            ],
        );
        vec![january, february]
    }

    #[test]
    fn test_integrate_end_to_end() {
        let result = Integrator::new().integrate(&sample_tables()).unwrap();

        assert_eq!(result.raw.height(), 5);
        assert_eq!(result.clean.height(), 4);

        let codes = string_values(&result.clean, "code").unwrap();
        assert_eq!(
            codes,
            vec![
                Some("AB1".to_string()),
                Some("ZZ9".to_string()),
                Some("AB1".to_string()),
                None,
            ]
        );

        let uoms = string_values(&result.clean, "uom").unwrap();
        assert_eq!(uoms[0].as_deref(), Some("KG"));
        assert_eq!(uoms[1].as_deref(), Some("KG"));
        assert_eq!(uoms[3].as_deref(), Some("PZ"));

        let stock = numeric_values(&result.clean, "stock").unwrap();
        assert_eq!(stock[0], Some(0.0));
        let real = numeric_values(&result.clean, "real").unwrap();
        assert_eq!(real[0], Some(10.0));
    }

    #[test]
    fn test_csv_codes_keep_their_digits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gennaio.csv");
        fs::write(&path, "Codice,Descrizione,Giacenza\n007,vite,1\n7,vite,2\n12E5,dado,3\n").unwrap();

        let tables = MonthlyLoader::new().load_all(&[(path, Month::Gennaio)]).unwrap();
        let result = Integrator::new().integrate(&tables).unwrap();

        assert_eq!(result.clean.height(), 3);
        let codes = string_values(&result.clean, "code").unwrap();
        assert_eq!(
            codes,
            vec![
                Some("007".to_string()),
                Some("7".to_string()),
                Some("12E5".to_string()),
            ]
        );
        let stock = numeric_values(&result.clean, "stock").unwrap();
        assert_eq!(stock, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_cleaned_output_invariants() {
        let result = Integrator::new().integrate(&sample_tables()).unwrap();
        let clean = &result.clean;

        for field in CanonicalField::QUANTITIES {
            let values = numeric_values(clean, field.name()).unwrap();
            assert!(values.iter().all(|v| matches!(v, Some(x) if *x >= 0.0)));
            assert_eq!(clean.column(field.name()).unwrap().null_count(), 0);
        }

        assert_eq!(clean.column("uom").unwrap().null_count(), 0);

        let months = string_values(clean, MONTH_COLUMN).unwrap();
        assert!(
            months
                .iter()
                .all(|m| m.as_deref().and_then(Month::from_label).is_some())
        );

        let codes = string_values(clean, "code").unwrap();
        assert!(codes.iter().flatten().all(|c| c
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())));

        let descriptions = string_values(clean, "description").unwrap();
        let mut keys = HashSet::new();
        for row in 0..clean.height() {
            assert!(keys.insert((codes[row].clone(), descriptions[row].clone(), months[row].clone())));
        }
    }

    #[test]
    fn test_concat_preserves_caller_order() {
        let integrator = Integrator::new();
        let mut tables = sample_tables();
        tables.reverse();

        let result = integrator.integrate(&tables).unwrap();
        let months = string_values(&result.raw, MONTH_COLUMN).unwrap();
        assert_eq!(months[0].as_deref(), Some("FEBBRAIO"));
        assert_eq!(months[4].as_deref(), Some("GENNAIO"));
    }

    #[test]
    fn test_concat_requires_tables() {
        assert!(Integrator::new().concat(Vec::new()).is_err());
    }

    #[test]
    fn test_month_summary_lists_every_month() {
        let result = Integrator::new().integrate(&sample_tables()).unwrap();
        let summary = month_summary(&result.clean).unwrap();

        assert_eq!(summary.height(), Month::ALL.len());
        let rows: Vec<Option<u64>> = summary.column("righe").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(rows[0], Some(2));
        assert_eq!(rows[1], Some(2));
        assert_eq!(rows[2], Some(0));
        let unique: Vec<Option<u64>> = summary.column("codici_unici").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(unique[1], Some(1));
    }
}
