//! Source Normalization
//!
//! Raw channel exports arrive with inconsistent header casing and spacing.
//! This module canonicalizes header names, resolves them against an explicit
//! column-alias table (resolved once per source, not per row), tags each row
//! with its channel identity, and concatenates all sources into one unified
//! record set. Row order is preserved within each source and source order is
//! preserved across sources, including under parallel normalization.

use crate::channel::Channel;
use crate::record::{BusinessRecord, RawRecord};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// A loosely-typed tabular source, as handed over by the loader.
///
/// The pipeline core never parses file formats; it receives columns and
/// string cells and produces strongly-typed records from them.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    /// Identity of the source, used in errors and warnings (e.g. a file name)
    pub source: String,
    /// Header row, as found in the source
    pub columns: Vec<String>,
    /// Data rows; each row has one cell per column
    pub rows: Vec<Vec<String>>,
}

/// Canonicalizes a header name: trim, lowercase, internal whitespace to `_`.
fn canonicalize_header(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Alias table for the marketing columns. Resolution happens once per source
/// against canonicalized headers; the first alias that matches wins.
const DATE_ALIASES: &[&str] = &["date", "day"];
const CAMPAIGN_ALIASES: &[&str] = &["campaign", "campaign_name"];
const IMPRESSIONS_ALIASES: &[&str] = &["impressions", "impression"];
const CLICKS_ALIASES: &[&str] = &["clicks", "click"];
const SPEND_ALIASES: &[&str] = &["spend", "cost"];
const ATTRIBUTED_REVENUE_ALIASES: &[&str] = &["attributed_revenue", "attr_revenue"];

/// Alias table for the business columns.
const TOTAL_REVENUE_ALIASES: &[&str] = &["total_revenue", "revenue"];
const GROSS_PROFIT_ALIASES: &[&str] = &["gross_profit"];
const COGS_ALIASES: &[&str] = &["cogs", "cost_of_goods_sold"];
const ORDERS_ALIASES: &[&str] = &["orders", "num_orders", "#_of_orders"];
const NEW_ORDERS_ALIASES: &[&str] = &["new_orders", "#_of_new_orders"];
const NEW_CUSTOMERS_ALIASES: &[&str] = &["new_customers"];

/// Resolved column positions for one marketing source.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    campaign: usize,
    impressions: usize,
    clicks: usize,
    spend: usize,
    attributed_revenue: usize,
}

impl ColumnMap {
    /// Resolves the required marketing columns against the source headers.
    ///
    /// # Errors
    /// Returns a `SchemaError` naming the first required column that no
    /// header resolves to.
    fn resolve(table: &SourceTable) -> Result<Self, SchemaError> {
        let canonical: Vec<String> = table.columns.iter().map(|c| canonicalize_header(c)).collect();
        let find = |aliases: &[&str], column: &'static str| -> Result<usize, SchemaError> {
            canonical
                .iter()
                .position(|header| aliases.contains(&header.as_str()))
                .ok_or_else(|| SchemaError {
                    source: table.source.clone(),
                    column,
                })
        };
        Ok(ColumnMap {
            date: find(DATE_ALIASES, "date")?,
            campaign: find(CAMPAIGN_ALIASES, "campaign")?,
            impressions: find(IMPRESSIONS_ALIASES, "impressions")?,
            clicks: find(CLICKS_ALIASES, "clicks")?,
            spend: find(SPEND_ALIASES, "spend")?,
            attributed_revenue: find(ATTRIBUTED_REVENUE_ALIASES, "attributed_revenue")?,
        })
    }
}

/// Fatal error: a required column is missing from a source after header
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Identity of the offending source
    pub source: String,
    /// Canonical name of the missing column
    pub column: &'static str,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source '{}' is missing required column '{}'",
            self.source, self.column
        )
    }
}

impl std::error::Error for SchemaError {}

/// Non-fatal data quality findings, counted and reported but never silently
/// dropping data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataQualityWarning {
    /// A numeric field came in negative; the row is retained
    NegativeValue {
        source: String,
        /// 1-based data row number
        row: usize,
        column: String,
        value: f64,
    },
    /// A row could not be parsed into a typed record and was skipped
    UnparseableRow {
        source: String,
        /// 1-based data row number
        row: usize,
        detail: String,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::NegativeValue {
                source,
                row,
                column,
                value,
            } => write!(
                f,
                "Source '{}' row {}: negative {} ({})",
                source, row, column, value
            ),
            DataQualityWarning::UnparseableRow { source, row, detail } => {
                write!(f, "Source '{}' row {}: unparseable ({})", source, row, detail)
            }
        }
    }
}

/// One normalized channel source: typed records in original row order plus
/// any data quality warnings raised while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSource {
    pub channel: Channel,
    pub records: Vec<RawRecord>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Parses a date cell. Accepts ISO `YYYY-MM-DD` and US `M/D/YYYY` forms.
fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%m/%d/%Y"))
        .ok()
}

/// Parses a money/quantity cell, tolerating `$`, `,` and surrounding space.
fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ','))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a count cell. Negative counts are clamped to zero; the caller is
/// responsible for raising the warning before clamping.
fn count_from(value: f64) -> u64 {
    if value < 0.0 {
        0
    } else {
        value.round() as u64
    }
}

/// Normalizes one channel source into typed records.
///
/// # Arguments
/// * `table` - The raw source table
/// * `channel` - Channel identity to tag every row with
///
/// # Returns
/// Typed records in the source's original row order, plus warnings for
/// negative values (rows retained) and unparseable rows (counted, skipped).
///
/// # Errors
/// Returns a `SchemaError` if a required column is absent after header
/// canonicalization.
pub fn normalize_source(
    table: &SourceTable,
    channel: Channel,
) -> Result<NormalizedSource, SchemaError> {
    let map = ColumnMap::resolve(table)?;
    let mut records = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let row_number = index + 1;
        // Unparseable rows have already recorded their warning
        if let Some(record) = parse_row(table, &map, row, row_number, &channel, &mut warnings) {
            records.push(record);
        }
    }

    debug!(
        source = %table.source,
        channel = %channel,
        records = records.len(),
        warnings = warnings.len(),
        "normalized source"
    );

    Ok(NormalizedSource {
        channel,
        records,
        warnings,
    })
}

fn parse_row(
    table: &SourceTable,
    map: &ColumnMap,
    row: &[String],
    row_number: usize,
    channel: &Channel,
    warnings: &mut Vec<DataQualityWarning>,
) -> Option<RawRecord> {
    let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");

    let unparseable = |detail: String, warnings: &mut Vec<DataQualityWarning>| {
        warnings.push(DataQualityWarning::UnparseableRow {
            source: table.source.clone(),
            row: row_number,
            detail,
        });
    };

    let date = match parse_date(cell(map.date)) {
        Some(date) => date,
        None => {
            unparseable(format!("bad date '{}'", cell(map.date)), warnings);
            return None;
        }
    };

    let mut numeric = |index: usize, column: &str| -> Option<f64> {
        match parse_number(cell(index)) {
            Some(value) => {
                if value < 0.0 {
                    warnings.push(DataQualityWarning::NegativeValue {
                        source: table.source.clone(),
                        row: row_number,
                        column: column.to_string(),
                        value,
                    });
                }
                Some(value)
            }
            None => None,
        }
    };

    let impressions = numeric(map.impressions, "impressions");
    let clicks = numeric(map.clicks, "clicks");
    let spend = numeric(map.spend, "spend");
    let attributed_revenue = numeric(map.attributed_revenue, "attributed_revenue");

    match (impressions, clicks, spend, attributed_revenue) {
        (Some(impressions), Some(clicks), Some(spend), Some(attributed_revenue)) => {
            Some(RawRecord {
                date,
                campaign: cell(map.campaign).trim().to_string(),
                channel: channel.clone(),
                impressions: count_from(impressions),
                clicks: count_from(clicks),
                spend,
                attributed_revenue,
            })
        }
        _ => {
            unparseable("non-numeric metric cell".to_string(), warnings);
            None
        }
    }
}

/// Normalizes every channel source and concatenates them into one unified
/// record set.
///
/// Sources are independent until concatenation, so they are normalized in
/// parallel; the merge is by input position, so the output ordering is
/// deterministic regardless of which source finishes first.
///
/// # Errors
/// Returns the first `SchemaError` in source order, aborting the run.
pub fn normalize_sources(
    sources: &[(Channel, SourceTable)],
) -> Result<(Vec<RawRecord>, Vec<DataQualityWarning>), SchemaError> {
    let normalized: Vec<NormalizedSource> = sources
        .par_iter()
        .map(|(channel, table)| normalize_source(table, channel.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for source in normalized {
        if !source.warnings.is_empty() {
            warn!(
                channel = %source.channel,
                count = source.warnings.len(),
                "data quality warnings while normalizing"
            );
        }
        records.extend(source.records);
        warnings.extend(source.warnings);
    }
    Ok((records, warnings))
}

/// Resolved column positions for the business source.
#[derive(Debug, Clone, Copy)]
struct BusinessColumnMap {
    date: usize,
    total_revenue: usize,
    gross_profit: Option<usize>,
    cogs: Option<usize>,
    orders: Option<usize>,
    new_orders: Option<usize>,
    new_customers: Option<usize>,
}

impl BusinessColumnMap {
    fn resolve(table: &SourceTable) -> Result<Self, SchemaError> {
        let canonical: Vec<String> = table.columns.iter().map(|c| canonicalize_header(c)).collect();
        let find = |aliases: &[&str]| -> Option<usize> {
            canonical
                .iter()
                .position(|header| aliases.contains(&header.as_str()))
        };
        let require = |aliases: &[&str], column: &'static str| -> Result<usize, SchemaError> {
            find(aliases).ok_or_else(|| SchemaError {
                source: table.source.clone(),
                column,
            })
        };
        Ok(BusinessColumnMap {
            date: require(DATE_ALIASES, "date")?,
            total_revenue: require(TOTAL_REVENUE_ALIASES, "total_revenue")?,
            gross_profit: find(GROSS_PROFIT_ALIASES),
            cogs: find(COGS_ALIASES),
            orders: find(ORDERS_ALIASES),
            new_orders: find(NEW_ORDERS_ALIASES),
            new_customers: find(NEW_CUSTOMERS_ALIASES),
        })
    }
}

/// Normalizes the business-outcomes source.
///
/// `date` and `total_revenue` are required; every other KPI column is carried
/// as `Some` only when the export actually ships it, so that downstream
/// ratios over absent columns stay undefined instead of being recomputed
/// against zero.
///
/// # Errors
/// Returns a `SchemaError` if `date` or `total_revenue` cannot be resolved.
pub fn normalize_business(
    table: &SourceTable,
) -> Result<(Vec<BusinessRecord>, Vec<DataQualityWarning>), SchemaError> {
    let map = BusinessColumnMap::resolve(table)?;
    let mut records = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let row_number = index + 1;
        let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");

        let date = match parse_date(cell(map.date)) {
            Some(date) => date,
            None => {
                warnings.push(DataQualityWarning::UnparseableRow {
                    source: table.source.clone(),
                    row: row_number,
                    detail: format!("bad date '{}'", cell(map.date)),
                });
                continue;
            }
        };
        let total_revenue = match parse_number(cell(map.total_revenue)) {
            Some(value) => {
                if value < 0.0 {
                    warnings.push(DataQualityWarning::NegativeValue {
                        source: table.source.clone(),
                        row: row_number,
                        column: "total_revenue".to_string(),
                        value,
                    });
                }
                value
            }
            None => {
                warnings.push(DataQualityWarning::UnparseableRow {
                    source: table.source.clone(),
                    row: row_number,
                    detail: "non-numeric total_revenue".to_string(),
                });
                continue;
            }
        };

        let optional_number = |index: Option<usize>| index.and_then(|i| parse_number(cell(i)));
        let optional_count =
            |index: Option<usize>| index.and_then(|i| parse_number(cell(i))).map(count_from);

        records.push(BusinessRecord {
            date,
            total_revenue,
            gross_profit: optional_number(map.gross_profit),
            cogs: optional_number(map.cogs),
            orders: optional_count(map.orders),
            new_orders: optional_count(map.new_orders),
            new_customers: optional_count(map.new_customers),
        });
    }

    Ok((records, warnings))
}
