use super::columns::{has_column, numeric_values, string_values};
use crate::models::{CanonicalField, DEDUP_KEY};
use anyhow::Result;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Tagged metric name (`before_rows`, `after_null_stock`, ...) to count.
pub type MetricMap = BTreeMap<String, u64>;

/// Flags every row whose key already appeared in an earlier row. Nulls compare
/// equal to each other.
pub fn duplicate_mask(df: &DataFrame, key: &[&str]) -> Result<Vec<bool>> {
    let key_columns: Vec<Vec<Option<String>>> = key
        .iter()
        .map(|name| string_values(df, name))
        .collect::<Result<_>>()?;

    let mut seen = HashSet::with_capacity(df.height());
    let mask = (0..df.height())
        .map(|row| {
            let row_key: Vec<Option<&str>> =
                key_columns.iter().map(|col| col[row].as_deref()).collect();
            !seen.insert(row_key)
        })
        .collect();

    Ok(mask)
}

pub fn count_duplicates(df: &DataFrame, key: &[&str]) -> Result<u64> {
    Ok(duplicate_mask(df, key)?.into_iter().filter(|dup| *dup).count() as u64)
}

/// Row count, per-quantity null and negative counts and the duplicate count
/// on the dedup key. Quantity columns are coerced before counting; columns
/// that are absent are skipped.
pub fn collect_metrics(df: &DataFrame, tag: &str) -> Result<MetricMap> {
    let mut metrics = MetricMap::new();
    metrics.insert(format!("{}_rows", tag), df.height() as u64);

    for field in CanonicalField::QUANTITIES {
        let name = field.name();
        if !has_column(df, name) {
            continue;
        }

        let values = numeric_values(df, name)?;
        let nulls = values.iter().filter(|v| v.is_none()).count();
        let negatives = values.iter().filter(|v| matches!(v, Some(x) if *x < 0.0)).count();

        metrics.insert(format!("{}_null_{}", tag, name), nulls as u64);
        metrics.insert(format!("{}_neg_{}", tag, name), negatives as u64);
    }

    if DEDUP_KEY.iter().all(|name| has_column(df, name)) {
        metrics.insert(format!("{}_dups", tag), count_duplicates(df, &DEDUP_KEY)?);
    }

    Ok(metrics)
}

#[derive(Debug, Clone, PartialEq)]
pub struct QaRow {
    pub metric: String,
    pub before: Option<u64>,
    pub after: Option<u64>,
    pub delta: Option<i64>,
}

fn untagged(metrics: &MetricMap) -> BTreeMap<&str, u64> {
    metrics
        .iter()
        .map(|(key, value)| {
            let name = key.split_once('_').map(|(_, name)| name).unwrap_or(key);
            (name, *value)
        })
        .collect()
}

/// One row per metric name, sorted by name. The delta is only filled in when
/// both sides carry the metric.
pub fn qa_summary(before: &MetricMap, after: &MetricMap) -> Vec<QaRow> {
    let before = untagged(before);
    let after = untagged(after);

    let names: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();

    names
        .into_iter()
        .map(|name| {
            let b = before.get(name).copied();
            let a = after.get(name).copied();
            QaRow {
                metric: name.to_string(),
                before: b,
                after: a,
                delta: match (b, a) {
                    (Some(b), Some(a)) => Some(a as i64 - b as i64),
                    _ => None,
                },
            }
        })
        .collect()
}

pub fn qa_summary_frame(rows: &[QaRow]) -> Result<DataFrame> {
    let metric: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
    let before: Vec<Option<u64>> = rows.iter().map(|r| r.before).collect();
    let after: Vec<Option<u64>> = rows.iter().map(|r| r.after).collect();
    let delta: Vec<Option<i64>> = rows.iter().map(|r| r.delta).collect();

    Ok(DataFrame::new(vec![
        Series::new("metric".into(), metric).into(),
        Series::new("before".into(), before).into(),
        Series::new("after".into(), after).into(),
        Series::new("delta".into(), delta).into(),
    ])?)
}

/// Null count of every column, in column order.
pub fn null_counts(df: &DataFrame) -> Result<DataFrame> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let counts: Vec<u64> = df
        .get_columns()
        .iter()
        .map(|col| col.null_count() as u64)
        .collect();

    Ok(DataFrame::new(vec![
        Series::new("colonna".into(), names).into(),
        Series::new("null_count".into(), counts).into(),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("code".into(), vec![Some("A1"), Some("A1"), None, None]).into(),
            Series::new("description".into(), vec![Some("vite"), Some("vite"), None, None]).into(),
            Series::new("stock".into(), vec![Some("-5"), Some("x"), Some("3"), None]).into(),
            Series::new("real".into(), vec![Some("1"), Some("2"), Some("-1"), Some("-2")]).into(),
            Series::new("mese_rif".into(), vec!["GENNAIO", "GENNAIO", "FEBBRAIO", "FEBBRAIO"]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_mask_treats_nulls_as_equal() {
        let mask = duplicate_mask(&raw_frame(), &DEDUP_KEY).unwrap();
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn test_collect_metrics() {
        let metrics = collect_metrics(&raw_frame(), "before").unwrap();

        assert_eq!(metrics["before_rows"], 4);
        assert_eq!(metrics["before_null_stock"], 2);
        assert_eq!(metrics["before_neg_stock"], 1);
        assert_eq!(metrics["before_null_real"], 0);
        assert_eq!(metrics["before_neg_real"], 2);
        assert_eq!(metrics["before_dups"], 2);
        // outgoing is absent, so it is not reported
        assert!(!metrics.contains_key("before_null_outgoing"));
    }

    #[test]
    fn test_dups_skipped_without_full_key() {
        let df = raw_frame().drop("mese_rif").unwrap();
        let metrics = collect_metrics(&df, "after").unwrap();
        assert!(!metrics.contains_key("after_dups"));
    }

    #[test]
    fn test_qa_summary_delta() {
        let mut before = MetricMap::new();
        before.insert("before_rows".to_string(), 10);
        before.insert("before_dups".to_string(), 3);
        before.insert("before_neg_stock".to_string(), 2);

        let mut after = MetricMap::new();
        after.insert("after_rows".to_string(), 7);
        after.insert("after_dups".to_string(), 0);

        let rows = qa_summary(&before, &after);
        let metrics: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["dups", "neg_stock", "rows"]);

        assert_eq!(rows[0].delta, Some(-3));
        assert_eq!(rows[1].after, None);
        assert_eq!(rows[1].delta, None);
        assert_eq!(rows[2].delta, Some(-3));

        let frame = qa_summary_frame(&rows).unwrap();
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.column("delta").unwrap().null_count(), 1);
    }

    #[test]
    fn test_null_counts() {
        let counts = null_counts(&raw_frame()).unwrap();
        let values: Vec<Option<u64>> = counts.column("null_count").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(2), Some(2), Some(1), Some(0), Some(0)]);
    }
}
