use super::columns::{has_column, numeric_or_zero, string_values};
use crate::models::{CanonicalField, InventoryRecord, MONTH_COLUMN, Month};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

pub const SAFETY_FACTOR: f64 = 0.5;
pub const TARGET_FACTOR: f64 = 1.5;
/// Upper bound (inclusive) of the LOW rotation class.
pub const LOW_ROTATION_MAX: f64 = 0.2;
/// Rates strictly above this are HIGH.
pub const HIGH_ROTATION_MIN: f64 = 1.0;
pub const MONTHS_PER_YEAR: f64 = 12.0;
pub const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StockLevel {
    Understock,
    Optimal,
    Overstock,
}

impl StockLevel {
    pub const ALL: [StockLevel; 3] = [StockLevel::Understock, StockLevel::Optimal, StockLevel::Overstock];

    pub fn label(&self) -> &'static str {
        match self {
            StockLevel::Understock => "UNDERSTOCK",
            StockLevel::Optimal => "OPTIMAL",
            StockLevel::Overstock => "OVERSTOCK",
        }
    }
}

impl fmt::Display for StockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RotationClass {
    High,
    Medium,
    Low,
    None,
}

impl RotationClass {
    pub const ALL: [RotationClass; 4] = [
        RotationClass::High,
        RotationClass::Medium,
        RotationClass::Low,
        RotationClass::None,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RotationClass::High => "HIGH",
            RotationClass::Medium => "MEDIUM",
            RotationClass::Low => "LOW",
            RotationClass::None => "NONE",
        }
    }
}

impl fmt::Display for RotationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify_stock_level(demand: f64, holding: f64) -> StockLevel {
    if holding < SAFETY_FACTOR * demand {
        StockLevel::Understock
    } else if holding > TARGET_FACTOR * demand {
        StockLevel::Overstock
    } else {
        StockLevel::Optimal
    }
}

/// Monthly consumption rate of an item; zero when nothing is held.
pub fn rotation_rate(demand: f64, holding: f64) -> f64 {
    if holding > 0.0 { demand / holding } else { 0.0 }
}

pub fn classify_rotation(rate: f64) -> RotationClass {
    if rate == 0.0 {
        RotationClass::None
    } else if rate > 0.0 && rate <= LOW_ROTATION_MAX {
        RotationClass::Low
    } else if rate > HIGH_ROTATION_MIN {
        RotationClass::High
    } else {
        RotationClass::Medium
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Rebuild typed records from the persisted dataset. Quantities are
/// re-coerced and zero-filled; rows whose month is not in the calendar are
/// dropped.
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<InventoryRecord>> {
    let months = string_values(df, MONTH_COLUMN)
        .with_context(|| format!("Dataset has no '{}' column", MONTH_COLUMN))?;

    let text_or_null = |field: CanonicalField| -> Result<Vec<Option<String>>> {
        if has_column(df, field.name()) {
            string_values(df, field.name())
        } else {
            Ok(vec![None; df.height()])
        }
    };

    let codes = text_or_null(CanonicalField::Code)?;
    let descriptions = text_or_null(CanonicalField::Description)?;
    let uoms = text_or_null(CanonicalField::Uom)?;
    let stock = numeric_or_zero(df, CanonicalField::Stock.name())?;
    let real = numeric_or_zero(df, CanonicalField::Real.name())?;
    let outgoing = numeric_or_zero(df, CanonicalField::Outgoing.name())?;

    let mut records = Vec::with_capacity(df.height());
    let mut dropped = 0usize;

    for row in 0..df.height() {
        let Some(month) = months[row].as_deref().and_then(Month::from_label) else {
            dropped += 1;
            continue;
        };

        records.push(InventoryRecord {
            code: codes[row].clone(),
            description: descriptions[row].clone(),
            uom: uoms[row].clone(),
            stock: stock[row],
            real: real[row],
            outgoing: outgoing[row],
            month,
        });
    }

    if dropped > 0 {
        debug!("Dropped {} rows with an unknown month", dropped);
    }

    Ok(records)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTurnover {
    pub month: Month,
    pub consumption_total: f64,
    pub stock_mean: f64,
    pub turnover: f64,
    pub turnover_annual: f64,
    /// Days inventory outstanding; NaN when the annual turnover is zero.
    pub dio: f64,
}

/// Per-month turnover for the months present in the data, in calendar order.
pub fn monthly_turnover(records: &[InventoryRecord]) -> Vec<MonthlyTurnover> {
    let mut by_month: BTreeMap<Month, Vec<&InventoryRecord>> = BTreeMap::new();
    for record in records {
        by_month.entry(record.month).or_default().push(record);
    }

    by_month
        .into_iter()
        .map(|(month, rows)| {
            let consumption_total: f64 = rows.iter().map(|r| r.consumption()).sum();
            let stock_mean = mean(rows.iter().map(|r| r.stock_avg())).unwrap_or(0.0);
            let turnover = if stock_mean > 0.0 {
                consumption_total / stock_mean
            } else {
                0.0
            };
            let turnover_annual = turnover * MONTHS_PER_YEAR;
            let dio = if turnover_annual > 0.0 {
                DAYS_PER_YEAR / turnover_annual
            } else {
                f64::NAN
            };

            MonthlyTurnover {
                month,
                consumption_total,
                stock_mean,
                turnover,
                turnover_annual,
                dio,
            }
        })
        .collect()
}

/// Annualized turnover over the whole period, scaled by the number of months
/// actually present.
pub fn period_turnover(records: &[InventoryRecord]) -> f64 {
    let months = records
        .iter()
        .map(|r| r.month)
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    let Some(stock_mean) = mean(records.iter().map(|r| r.stock_avg())) else {
        return 0.0;
    };
    if stock_mean <= 0.0 || months == 0 {
        return 0.0;
    }

    let consumption: f64 = records.iter().map(|r| r.consumption()).sum();
    (consumption / stock_mean) * (MONTHS_PER_YEAR / months as f64)
}

/// Mean of the defined monthly DIO values, NaN when there are none.
pub fn average_dio(months: &[MonthlyTurnover]) -> f64 {
    mean(months.iter().map(|m| m.dio).filter(|d| !d.is_nan())).unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemKpi {
    pub code: String,
    pub demand_mean: f64,
    pub holding_mean: f64,
    pub safety: f64,
    pub target: f64,
    pub stock_level: StockLevel,
    pub rotation_rate: f64,
    pub rotation: RotationClass,
}

/// One entry per non-null code, sorted by code.
pub fn item_kpis(records: &[InventoryRecord]) -> Vec<ItemKpi> {
    let mut by_code: BTreeMap<&str, Vec<&InventoryRecord>> = BTreeMap::new();
    for record in records {
        if let Some(code) = record.code.as_deref() {
            by_code.entry(code).or_default().push(record);
        }
    }

    by_code
        .into_iter()
        .map(|(code, rows)| {
            let demand_mean = mean(rows.iter().map(|r| r.consumption())).unwrap_or(0.0);
            let holding_mean = mean(rows.iter().map(|r| r.stock_avg())).unwrap_or(0.0);
            let rate = rotation_rate(demand_mean, holding_mean);

            ItemKpi {
                code: code.to_string(),
                demand_mean,
                holding_mean,
                safety: SAFETY_FACTOR * demand_mean,
                target: TARGET_FACTOR * demand_mean,
                stock_level: classify_stock_level(demand_mean, holding_mean),
                rotation_rate: rate,
                rotation: classify_rotation(rate),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassShare {
    pub class: &'static str,
    pub count: u64,
    pub percent: f64,
}

fn shares(counts: Vec<(&'static str, u64)>) -> Vec<ClassShare> {
    let total: u64 = counts.iter().map(|(_, c)| c).sum();
    counts
        .into_iter()
        .map(|(class, count)| ClassShare {
            class,
            count,
            percent: if total > 0 {
                round2(count as f64 / total as f64 * 100.0)
            } else {
                0.0
            },
        })
        .collect()
}

/// Present stock-level classes, most frequent first.
pub fn stock_level_distribution(items: &[ItemKpi]) -> Vec<ClassShare> {
    let mut counts: Vec<(StockLevel, u64)> = StockLevel::ALL
        .iter()
        .map(|level| {
            let count = items.iter().filter(|i| i.stock_level == *level).count() as u64;
            (*level, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    // stable sort keeps UNDERSTOCK, OPTIMAL, OVERSTOCK on ties
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    shares(counts.into_iter().map(|(level, c)| (level.label(), c)).collect())
}

/// Every rotation class in HIGH, MEDIUM, LOW, NONE order, absent ones at zero.
pub fn rotation_distribution(items: &[ItemKpi]) -> Vec<ClassShare> {
    shares(
        RotationClass::ALL
            .iter()
            .map(|class| {
                let count = items.iter().filter(|i| i.rotation == *class).count() as u64;
                (class.label(), count)
            })
            .collect(),
    )
}

pub struct KpiReport {
    pub months: Vec<MonthlyTurnover>,
    pub period_turnover: f64,
    pub average_dio: f64,
    pub items: Vec<ItemKpi>,
    pub stock_levels: Vec<ClassShare>,
    pub rotation: Vec<ClassShare>,
}

pub struct KpiEngine;

impl KpiEngine {
    pub fn new() -> Self {
        KpiEngine
    }

    pub fn compute(&self, df: &DataFrame) -> Result<KpiReport> {
        let records = records_from_frame(df)?;
        Ok(self.compute_records(&records))
    }

    pub fn compute_records(&self, records: &[InventoryRecord]) -> KpiReport {
        let months = monthly_turnover(records);
        let items = item_kpis(records);

        let report = KpiReport {
            period_turnover: period_turnover(records),
            average_dio: average_dio(&months),
            stock_levels: stock_level_distribution(&items),
            rotation: rotation_distribution(&items),
            months,
            items,
        };

        info!(
            "KPIs over {} rows: {} months, {} items, period turnover {:.2}, average DIO {:.0}",
            records.len(),
            report.months.len(),
            report.items.len(),
            report.period_turnover,
            report.average_dio
        );

        report
    }
}

impl Default for KpiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KpiReport {
    pub fn turnover_frame(&self) -> Result<DataFrame> {
        let labels: Vec<&str> = self.months.iter().map(|m| m.month.label()).collect();
        let turnover: Vec<f64> = self.months.iter().map(|m| m.turnover).collect();
        let annual: Vec<f64> = self.months.iter().map(|m| m.turnover_annual).collect();

        Ok(DataFrame::new(vec![
            Series::new(MONTH_COLUMN.into(), labels).into(),
            Series::new("turnover_m".into(), turnover).into(),
            Series::new("turnover_annuo".into(), annual).into(),
        ])?)
    }

    /// Undefined DIO is written as null.
    pub fn dio_frame(&self) -> Result<DataFrame> {
        let labels: Vec<&str> = self.months.iter().map(|m| m.month.label()).collect();
        let dio: Vec<Option<f64>> = self
            .months
            .iter()
            .map(|m| (!m.dio.is_nan()).then_some(m.dio))
            .collect();

        Ok(DataFrame::new(vec![
            Series::new(MONTH_COLUMN.into(), labels).into(),
            Series::new("DIO".into(), dio).into(),
        ])?)
    }

    pub fn stock_level_frame(&self) -> Result<DataFrame> {
        share_frame("classe", &self.stock_levels)
    }

    pub fn rotation_frame(&self) -> Result<DataFrame> {
        share_frame("classe_rot", &self.rotation)
    }

    pub fn items_frame(&self) -> Result<DataFrame> {
        let items = &self.items;
        Ok(DataFrame::new(vec![
            Series::new("code".into(), items.iter().map(|i| i.code.as_str()).collect::<Vec<_>>()).into(),
            Series::new("domanda_media".into(), items.iter().map(|i| i.demand_mean).collect::<Vec<_>>()).into(),
            Series::new("giacenza_media".into(), items.iter().map(|i| i.holding_mean).collect::<Vec<_>>()).into(),
            Series::new("safety".into(), items.iter().map(|i| i.safety).collect::<Vec<_>>()).into(),
            Series::new("target".into(), items.iter().map(|i| i.target).collect::<Vec<_>>()).into(),
            Series::new("classe".into(), items.iter().map(|i| i.stock_level.label()).collect::<Vec<_>>()).into(),
            Series::new("tasso_mensile".into(), items.iter().map(|i| i.rotation_rate).collect::<Vec<_>>()).into(),
            Series::new("classe_rot".into(), items.iter().map(|i| i.rotation.label()).collect::<Vec<_>>()).into(),
        ])?)
    }
}

fn share_frame(class_column: &str, rows: &[ClassShare]) -> Result<DataFrame> {
    let classes: Vec<&str> = rows.iter().map(|r| r.class).collect();
    let counts: Vec<u64> = rows.iter().map(|r| r.count).collect();
    let percents: Vec<f64> = rows.iter().map(|r| r.percent).collect();

    Ok(DataFrame::new(vec![
        Series::new(class_column.into(), classes).into(),
        Series::new("conteggio".into(), counts).into(),
        Series::new("percentuale".into(), percents).into(),
    ])?)
}
