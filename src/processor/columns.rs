use super::field_normalizer::to_num;
use anyhow::Result;
use polars::prelude::*;

/// Values of a column as owned strings, whatever its dtype.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    let values = match column.str() {
        Ok(ca) => ca.into_iter().map(|v| v.map(str::to_string)).collect(),
        Err(_) => {
            let casted = column.cast(&DataType::String)?;
            casted
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect()
        }
    };
    Ok(values)
}

/// Values of a column coerced to numbers. Text goes through the lenient
/// parser; anything unparseable, NaN or infinite becomes `None`.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let values = match column.str() {
        Ok(ca) => ca.into_iter().map(|v| v.and_then(to_num)).collect(),
        Err(_) => {
            let casted = column.cast(&DataType::Float64)?;
            casted
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect()
        }
    };
    Ok(values)
}

/// Same as [`numeric_values`] but a missing column reads as all zeros and
/// nulls are zero-filled.
pub fn numeric_or_zero(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    if df.column(name).is_err() {
        return Ok(vec![0.0; df.height()]);
    }
    Ok(numeric_values(df, name)?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}
