use super::columns::string_values;
use crate::models::CanonicalField;
use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, warn};

/// Outcome of looking up one canonical field among the source headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMatch {
    /// Source header that was picked.
    pub column: String,
    /// Alias that produced the hit.
    pub alias: &'static str,
    pub exact: bool,
    /// Every header that matched the winning alias, in source order, when more
    /// than one did.
    pub ambiguous: Vec<String>,
}

fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

fn exact_hit(header: &str, alias: &str) -> bool {
    header == alias
}

fn substring_hit(header: &str, alias: &str) -> bool {
    header.contains(alias)
}

/// Ranked alias lookup: exact matches for every alias first, then substring
/// containment. Within a phase aliases are tried best-first and, for one
/// alias, headers in source order.
pub fn find_column(headers: &[String], aliases: &[&'static str]) -> Option<ColumnMatch> {
    let normalized: Vec<(String, &String)> = headers
        .iter()
        .map(|h| (normalize_header(h), h))
        .collect();

    let phases: [(bool, fn(&str, &str) -> bool); 2] = [(true, exact_hit), (false, substring_hit)];

    for (exact, is_hit) in phases {
        for &alias in aliases {
            let hits: Vec<&String> = normalized
                .iter()
                .filter(|(header, _)| is_hit(header, alias))
                .map(|(_, original)| *original)
                .collect();

            if let Some(first) = hits.first() {
                let ambiguous = if hits.len() > 1 {
                    hits.iter().map(|h| h.to_string()).collect()
                } else {
                    Vec::new()
                };

                return Some(ColumnMatch {
                    column: first.to_string(),
                    alias,
                    exact,
                    ambiguous,
                });
            }
        }
    }

    None
}

pub struct ColumnStandardizer;

impl ColumnStandardizer {
    pub fn new() -> Self {
        ColumnStandardizer
    }

    /// Resolve every canonical field against the given headers.
    pub fn resolve(&self, headers: &[String]) -> Vec<(CanonicalField, Option<ColumnMatch>)> {
        CanonicalField::ALL
            .iter()
            .map(|field| (*field, find_column(headers, field.aliases())))
            .collect()
    }

    /// Build a frame holding exactly the canonical columns, in canonical order.
    /// Fields without a matching source column are filled with nulls.
    pub fn standardize(&self, df: &DataFrame, source: &str) -> Result<DataFrame> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let height = df.height();
        let mut columns: Vec<Column> = Vec::with_capacity(CanonicalField::ALL.len());

        for (field, found) in self.resolve(&headers) {
            let values: Vec<Option<String>> = match found {
                Some(found) => {
                    if !found.ambiguous.is_empty() {
                        warn!(
                            "{}: column '{}' is ambiguous for '{}' (candidates {:?}), using '{}'",
                            source,
                            found.alias,
                            field.name(),
                            found.ambiguous,
                            found.column
                        );
                    }
                    debug!(
                        "{}: {} <- '{}' ({} match on '{}')",
                        source,
                        field.name(),
                        found.column,
                        if found.exact { "exact" } else { "substring" },
                        found.alias
                    );
                    string_values(df, &found.column)?
                }
                None => {
                    warn!("{}: no column found for '{}', filling with nulls", source, field.name());
                    vec![None; height]
                }
            };

            columns.push(Series::new(field.name().into(), values).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}

impl Default for ColumnStandardizer {
    fn default() -> Self {
        Self::new()
    }
}
