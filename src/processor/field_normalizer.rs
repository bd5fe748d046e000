use super::columns::{numeric_values, string_values};
use crate::models::{CanonicalField, DEFAULT_UOM, UOM_SYNONYMS};
use anyhow::Result;
use polars::prelude::*;
use regex::Regex;
use std::sync::LazyLock;

// First signed digit run, separators included: "12,5 kg" -> "12,5"
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d[\d.,]*").expect("number token pattern"));

/// Lenient numeric coercion. Never fails: anything that cannot be read as a
/// finite number is `None`.
pub fn to_num(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = trimmed.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    // Thousands may be grouped with spaces or apostrophes
    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let token = NUMBER_TOKEN.find(&compact)?.as_str();
    parse_localized(token.trim_end_matches(['.', ',']))
}

/// Resolve decimal/thousands separators. With both kinds present the right-most
/// is the decimal mark; a single comma is a decimal comma; a repeated separator
/// groups thousands.
fn parse_localized(token: &str) -> Option<f64> {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(_)) if token.matches(',').count() == 1 => token.replace(',', "."),
        (None, Some(_)) => token.replace(',', ""),
        (Some(_), None) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Uppercase and keep only `[A-Z0-9]`. The literal `NAN` (what a blank cell
/// turns into once stringified) is treated as missing.
pub fn normalize_code(value: Option<&str>) -> Option<String> {
    let cleaned: String = value?
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    if cleaned == "NAN" { None } else { Some(cleaned) }
}

pub fn normalize_uom(value: Option<&str>) -> String {
    let unit = value.map(|v| v.to_uppercase().trim().to_string()).unwrap_or_default();

    if UOM_SYNONYMS.contains(&unit.as_str()) {
        DEFAULT_UOM.to_string()
    } else {
        unit
    }
}

/// Negative quantities become zero; missing stays missing.
pub fn clamp_non_negative(value: Option<f64>) -> Option<f64> {
    value.map(|v| if v < 0.0 { 0.0 } else { v })
}

pub struct FieldNormalizer;

impl FieldNormalizer {
    pub fn normalize_dataframe(&self, df: &mut DataFrame) -> Result<()> {
        self.normalize_code_column(df, CanonicalField::Code.name())?;
        self.normalize_uom_column(df, CanonicalField::Uom.name())?;

        for field in CanonicalField::QUANTITIES {
            self.normalize_quantity_column(df, field.name())?;
        }

        Ok(())
    }

    fn normalize_code_column(&self, df: &mut DataFrame, col_name: &str) -> Result<()> {
        if df.column(col_name).is_ok() {
            let normalized: Vec<Option<String>> = string_values(df, col_name)?
                .iter()
                .map(|v| normalize_code(v.as_deref()))
                .collect();

            df.with_column(Series::new(col_name.into(), normalized))?;
        }

        Ok(())
    }

    fn normalize_uom_column(&self, df: &mut DataFrame, col_name: &str) -> Result<()> {
        if df.column(col_name).is_ok() {
            let normalized: Vec<String> = string_values(df, col_name)?
                .iter()
                .map(|v| normalize_uom(v.as_deref()))
                .collect();

            df.with_column(Series::new(col_name.into(), normalized))?;
        }

        Ok(())
    }

    /// Coerce, clamp at zero and fill the remaining nulls with zero.
    fn normalize_quantity_column(&self, df: &mut DataFrame, col_name: &str) -> Result<()> {
        if df.column(col_name).is_ok() {
            let normalized: Vec<f64> = numeric_values(df, col_name)?
                .into_iter()
                .map(|v| clamp_non_negative(v).unwrap_or(0.0))
                .collect();

            df.with_column(Series::new(col_name.into(), normalized))?;
        }

        Ok(())
    }
}
