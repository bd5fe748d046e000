use serde::{Deserialize, Serialize};
use std::fmt;

/// Column holding the month label of every integrated row.
pub const MONTH_COLUMN: &str = "mese_rif";

/// Canonical unit of measure applied when a row carries none.
pub const DEFAULT_UOM: &str = "KG";

/// Source labels that are known to mean the canonical unit.
pub const UOM_SYNONYMS: &[&str] = &["PAGINA", "PAGES", "", "NAN"];

/// Key used for deduplication of the integrated dataset.
pub const DEDUP_KEY: [&str; 3] = ["code", "description", MONTH_COLUMN];

/// Business calendar covered by the monthly exports. March is not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Month {
    Gennaio,
    Febbraio,
    Aprile,
    Maggio,
    Giugno,
    Luglio,
    Agosto,
}

impl Month {
    pub const ALL: [Month; 7] = [
        Month::Gennaio,
        Month::Febbraio,
        Month::Aprile,
        Month::Maggio,
        Month::Giugno,
        Month::Luglio,
        Month::Agosto,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Month::Gennaio => "GENNAIO",
            Month::Febbraio => "FEBBRAIO",
            Month::Aprile => "APRILE",
            Month::Maggio => "MAGGIO",
            Month::Giugno => "GIUGNO",
            Month::Luglio => "LUGLIO",
            Month::Agosto => "AGOSTO",
        }
    }

    /// Parse a label, tolerating surrounding whitespace and lowercase input.
    pub fn from_label(label: &str) -> Option<Month> {
        let wanted = label.trim().to_uppercase();
        Self::ALL.iter().copied().find(|m| m.label() == wanted)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical schema every monthly sheet is standardized onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Code,
    Description,
    Uom,
    Stock,
    Real,
    Outgoing,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::Code,
        CanonicalField::Description,
        CanonicalField::Uom,
        CanonicalField::Stock,
        CanonicalField::Real,
        CanonicalField::Outgoing,
    ];

    pub const QUANTITIES: [CanonicalField; 3] = [
        CanonicalField::Stock,
        CanonicalField::Real,
        CanonicalField::Outgoing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Code => "code",
            CanonicalField::Description => "description",
            CanonicalField::Uom => "uom",
            CanonicalField::Stock => "stock",
            CanonicalField::Real => "real",
            CanonicalField::Outgoing => "outgoing",
        }
    }

    /// Accepted source header spellings, best first. Matching is done on
    /// lowercased, trimmed headers.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Code => &["code", "codice", "item_code"],
            CanonicalField::Description => &["description", "descrizione"],
            CanonicalField::Uom => &[
                "um",
                "uom",
                "unit_of_measure",
                "unit measure",
                "unit_measure",
            ],
            CanonicalField::Stock => &[
                "giacenza",
                "stock_quantity",
                "stock_level",
                "total_quantity",
                "total_stock",
            ],
            CanonicalField::Real => &["reale", "real", "real_stock", "actual_quantity"],
            CanonicalField::Outgoing => &[
                "scaricare",
                "to_download",
                "withdrawal_quantity",
                "ship_outgoing",
                "stock_scarico",
            ],
        }
    }
}

/// One cleaned row of the integrated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub code: Option<String>,
    pub description: Option<String>,
    pub uom: Option<String>,
    pub stock: f64,
    pub real: f64,
    pub outgoing: f64,
    pub month: Month,
}

impl InventoryRecord {
    pub fn stock_avg(&self) -> f64 {
        (self.stock + self.real) / 2.0
    }

    pub fn consumption(&self) -> f64 {
        self.outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_calendar_skips_march() {
        let labels: Vec<&str> = Month::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(
            labels,
            vec!["GENNAIO", "FEBBRAIO", "APRILE", "MAGGIO", "GIUGNO", "LUGLIO", "AGOSTO"]
        );
        assert!(Month::Febbraio < Month::Aprile);
    }

    #[test]
    fn test_month_from_label() {
        assert_eq!(Month::from_label(" giugno "), Some(Month::Giugno));
        assert_eq!(Month::from_label("MARZO"), None);
        assert_eq!(Month::from_label(""), None);
    }

    #[test]
    fn test_month_serde_uses_labels() {
        #[derive(Deserialize)]
        struct Wrapper {
            month: Month,
        }
        let parsed: Wrapper = toml::from_str("month = \"LUGLIO\"").unwrap();
        assert_eq!(parsed.month, Month::Luglio);
    }

    #[test]
    fn test_stock_avg() {
        let record = InventoryRecord {
            code: Some("AB1".to_string()),
            description: None,
            uom: Some(DEFAULT_UOM.to_string()),
            stock: 4.0,
            real: 10.0,
            outgoing: 3.0,
            month: Month::Gennaio,
        };
        assert_eq!(record.stock_avg(), 7.0);
        assert_eq!(record.consumption(), 3.0);
    }
}
