use crate::models::{CanonicalField, MONTH_COLUMN, Month};
use crate::report::{HtmlPage, column_text, format_float};
use anyhow::Result;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

const EXAMPLE_LIMIT: usize = 5;
const EXAMPLE_WIDTH: usize = 25;
const TOP_UNITS: usize = 10;

fn describe(column: &str) -> &'static str {
    match column {
        "code" => "Codice materiale univoco (alfanumerico).",
        "description" => "Descrizione testuale del materiale.",
        "uom" => "Unità di misura standardizzata per le quantità.",
        "stock" => "Giacenza a fine periodo (quantità fisica/contabile).",
        "real" => "Giacenza reale (conteggio fisico o stock effettivo).",
        "outgoing" => "Quantità in uscita (prelievi/spedizioni) nel periodo.",
        MONTH_COLUMN => "Mese di riferimento del record (GENNAIO…AGOSTO).",
        _ => "",
    }
}

fn rules(column: &str) -> &'static str {
    match column {
        "code" => "Solo A-Z e 0-9; maiuscolo; non vuoto nei record validi.",
        "description" => "Testo libero; evitare nulli per record attivi.",
        "uom" => "Valori ammessi: KG (default).",
        "stock" | "real" | "outgoing" => "Valore numerico, non negativo.",
        MONTH_COLUMN => {
            "Valori ammessi: GENNAIO, FEBBRAIO, APRILE, MAGGIO, GIUGNO, LUGLIO, AGOSTO."
        }
        _ => "",
    }
}

fn unit(column: &str) -> &'static str {
    match column {
        "uom" => "-",
        "stock" | "real" | "outgoing" => "pezzi o unità coerenti con uom",
        _ => "",
    }
}

pub fn human_type(dtype: &DataType) -> &'static str {
    if dtype.is_integer() {
        "integer"
    } else if dtype.is_float() {
        "float"
    } else if matches!(dtype, DataType::Boolean) {
        "boolean"
    } else {
        "string"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub description: &'static str,
    pub kind: &'static str,
    pub unit: &'static str,
    pub cardinality: u64,
    pub null_count: u64,
    pub null_percent: f64,
    pub examples: Vec<String>,
    pub rules: &'static str,
    pub notes: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: Option<String>,
}

/// Canonical columns first, in canonical order, then the rest as found.
pub fn ordered_columns(df: &DataFrame) -> Vec<String> {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let canonical: Vec<&str> = CanonicalField::ALL
        .iter()
        .map(|f| f.name())
        .chain(std::iter::once(MONTH_COLUMN))
        .collect();

    let mut ordered: Vec<String> = canonical
        .iter()
        .filter(|name| present.iter().any(|p| p.as_str() == **name))
        .map(|name| name.to_string())
        .collect();

    for name in present {
        if !ordered.contains(&name) {
            ordered.push(name);
        }
    }

    ordered
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(human_type(dtype), "integer" | "float")
}

/// Uppercased values by descending frequency; ties keep first appearance.
fn top_values(values: &[String], limit: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for value in values {
        let upper = value.to_uppercase();
        let count = counts.entry(upper.clone()).or_insert(0);
        if *count == 0 {
            order.push(upper);
        }
        *count += 1;
    }

    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(limit);
    order
}

pub fn profile_column(df: &DataFrame, name: &str) -> Result<ColumnProfile> {
    let column = df.column(name)?;
    let height = df.height();
    let null_count = column.null_count() as u64;

    let text = column_text(column)?;
    let present: Vec<String> = text
        .into_iter()
        .zip(column.is_not_null().into_iter())
        .filter_map(|(value, keep)| keep.unwrap_or(false).then_some(value))
        .collect();

    let mut seen = HashSet::new();
    let distinct: Vec<&String> = present.iter().filter(|v| seen.insert(*v)).collect();

    let examples: Vec<String> = distinct
        .iter()
        .take(EXAMPLE_LIMIT)
        .map(|v| v.chars().take(EXAMPLE_WIDTH).collect::<String>())
        .collect();

    let (min, max) = if is_numeric(column.dtype()) {
        let casted = column.cast(&DataType::Float64)?;
        let numbers: Vec<f64> = casted.f64()?.into_iter().flatten().filter(|v| !v.is_nan()).collect();
        (
            numbers.iter().copied().reduce(f64::min),
            numbers.iter().copied().reduce(f64::max),
        )
    } else {
        (None, None)
    };

    let allowed = match name {
        "uom" => Some(top_values(&present, TOP_UNITS).join(", ")),
        MONTH_COLUMN => {
            let labels: HashSet<String> = present.iter().map(|v| v.to_uppercase()).collect();
            Some(
                Month::ALL
                    .iter()
                    .map(|m| m.label())
                    .filter(|label| labels.contains(*label))
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        }
        _ => None,
    };

    Ok(ColumnProfile {
        name: name.to_string(),
        description: describe(name),
        kind: human_type(column.dtype()),
        unit: unit(name),
        cardinality: distinct.len() as u64,
        null_count,
        null_percent: if height > 0 {
            (null_count as f64 / height as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        },
        examples,
        rules: rules(name),
        notes: String::new(),
        min,
        max,
        allowed,
    })
}

pub struct DataDictionary {
    pub profiles: Vec<ColumnProfile>,
}

impl DataDictionary {
    pub fn build(df: &DataFrame) -> Result<Self> {
        let profiles = ordered_columns(df)
            .iter()
            .map(|name| profile_column(df, name))
            .collect::<Result<_>>()?;
        Ok(DataDictionary { profiles })
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let p = &self.profiles;
        let opt_float = |v: Option<f64>| v.map(format_float).unwrap_or_default();

        Ok(DataFrame::new(vec![
            Series::new("Colonna".into(), p.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()).into(),
            Series::new("Descrizione".into(), p.iter().map(|c| c.description).collect::<Vec<_>>()).into(),
            Series::new("Tipo".into(), p.iter().map(|c| c.kind).collect::<Vec<_>>()).into(),
            Series::new("Unità".into(), p.iter().map(|c| c.unit).collect::<Vec<_>>()).into(),
            Series::new("Cardinalità".into(), p.iter().map(|c| c.cardinality).collect::<Vec<_>>()).into(),
            Series::new("Null (n)".into(), p.iter().map(|c| c.null_count).collect::<Vec<_>>()).into(),
            Series::new("Null (%)".into(), p.iter().map(|c| c.null_percent).collect::<Vec<_>>()).into(),
            Series::new("Esempi".into(), p.iter().map(|c| c.examples.join(", ")).collect::<Vec<_>>()).into(),
            Series::new("Regole/Controlli".into(), p.iter().map(|c| c.rules).collect::<Vec<_>>()).into(),
            Series::new("Note".into(), p.iter().map(|c| c.notes.as_str()).collect::<Vec<_>>()).into(),
            Series::new("Min".into(), p.iter().map(|c| opt_float(c.min)).collect::<Vec<_>>()).into(),
            Series::new("Max".into(), p.iter().map(|c| opt_float(c.max)).collect::<Vec<_>>()).into(),
            Series::new(
                "Valori ammessi".into(),
                p.iter().map(|c| c.allowed.clone().unwrap_or_default()).collect::<Vec<_>>(),
            )
            .into(),
        ])?)
    }

    pub fn to_html(&self, source: &str) -> Result<String> {
        let frame = self.to_frame()?;
        let mut page = HtmlPage::new("Data Dictionary");
        page.table(&frame, None)?.footer(&format!("Fonte: {}", source));
        Ok(page.render())
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec!["# Data Dictionary".to_string()];

        for c in &self.profiles {
            lines.push(format!("## {}", c.name));
            lines.push(format!("- Descrizione: {}", c.description));
            lines.push(format!("- Tipo: {}", c.kind));
            lines.push(format!("- Unità: {}", c.unit));
            lines.push(format!("- Cardinalità: {}", c.cardinality));
            lines.push(format!("- Null (n): {} - Null (%): {}%", c.null_count, c.null_percent));
            if let (Some(min), Some(max)) = (c.min, c.max) {
                lines.push(format!(
                    "- Range numerico: min={} - max={}",
                    format_float(min),
                    format_float(max)
                ));
            }
            if let Some(allowed) = c.allowed.as_deref().filter(|a| !a.is_empty()) {
                lines.push(format!("- Valori ammessi: {}", allowed));
            }
            lines.push(format!("- Regole/Controlli: {}", c.rules));
            lines.push(format!("- Note: {}", c.notes));
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> DataFrame {
        DataFrame::new(vec![
            Series::new("extra".into(), vec![Some("x"), None, Some("y"), None]).into(),
            Series::new("mese_rif".into(), vec!["FEBBRAIO", "GENNAIO", "GENNAIO", "AGOSTO"]).into(),
            Series::new("uom".into(), vec!["KG", "PZ", "KG", "kg"]).into(),
            Series::new("stock".into(), vec![0.0f64, 12.5, 3.0, 12.5]).into(),
            Series::new("code".into(), vec![
                Some("A1"),
                Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123"),
                None,
                Some("A1"),
            ])
            .into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_order() {
        assert_eq!(ordered_columns(&dataset()), vec!["code", "uom", "stock", "mese_rif", "extra"]);
    }

    #[test]
    fn test_profile_code() {
        let profile = profile_column(&dataset(), "code").unwrap();
        assert_eq!(profile.kind, "string");
        assert_eq!(profile.cardinality, 2);
        assert_eq!(profile.null_count, 1);
        assert_eq!(profile.null_percent, 25.0);
        assert_eq!(profile.examples, vec!["A1".to_string(), "ABCDEFGHIJKLMNOPQRSTUVWXY".to_string()]);
        assert_eq!(profile.min, None);
        assert_eq!(profile.allowed, None);
    }

    #[test]
    fn test_profile_numeric_range() {
        let profile = profile_column(&dataset(), "stock").unwrap();
        assert_eq!(profile.kind, "float");
        assert_eq!(profile.cardinality, 3);
        assert_eq!(profile.min, Some(0.0));
        assert_eq!(profile.max, Some(12.5));
        assert_eq!(profile.unit, "pezzi o unità coerenti con uom");
    }

    #[test]
    fn test_allowed_values() {
        let df = dataset();
        let uom = profile_column(&df, "uom").unwrap();
        assert_eq!(uom.allowed.as_deref(), Some("KG, PZ"));

        let month = profile_column(&df, "mese_rif").unwrap();
        assert_eq!(month.allowed.as_deref(), Some("GENNAIO, FEBBRAIO, AGOSTO"));
    }

    #[test]
    fn test_outputs() {
        let dictionary = DataDictionary::build(&dataset()).unwrap();
        let frame = dictionary.to_frame().unwrap();
        assert_eq!(frame.height(), 5);
        assert_eq!(frame.width(), 13);

        let markdown = dictionary.to_markdown();
        assert!(markdown.starts_with("# Data Dictionary"));
        assert!(markdown.contains("## stock\n"));
        assert!(markdown.contains("- Range numerico: min=0 - max=12.5"));
        assert!(markdown.contains("- Valori ammessi: GENNAIO, FEBBRAIO, AGOSTO"));

        let html = dictionary.to_html("dataset.parquet").unwrap();
        assert!(html.contains("<th>Colonna</th>"));
        assert!(html.contains("Fonte: dataset.parquet"));
    }
}
