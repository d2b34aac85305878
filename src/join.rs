//! Business Join
//!
//! Left-joins the daily marketing aggregate onto the business-outcomes
//! series, business side driving: every business date survives, marketing-only
//! dates are dropped (but counted), and business dates with no marketing
//! activity carry absent marketing fields rather than zeros.

use crate::aggregate::AggregateRecord;
use crate::metric::{DerivedMetrics, Ratio};
use crate::record::BusinessRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The marketing side of one combined row: the daily sums plus the metrics
/// derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingDay {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub attributed_revenue: f64,
    pub metrics: DerivedMetrics,
}

/// One business date with its marketing activity, when any exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub date: NaiveDate,
    pub business: BusinessRecord,
    /// Absent (not zero) when the date had no marketing activity
    pub marketing: Option<MarketingDay>,
    /// attributed_revenue / total_revenue; undefined when either side is
    /// missing or total_revenue is zero
    pub marketing_revenue_share: Ratio,
    /// spend / total_revenue; undefined when either side is missing or
    /// total_revenue is zero
    pub marketing_spend_ratio: Ratio,
    /// gross_profit / total_revenue; undefined when the export does not carry
    /// gross_profit or total_revenue is zero
    pub gross_margin_pct: Ratio,
}

/// Result of the left join, including the unmatched-date counts surfaced to
/// the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    /// One row per business date, in business-series order
    pub rows: Vec<CombinedRecord>,
    /// Business dates with no marketing aggregate (rows kept, marketing absent)
    pub unmatched_business_dates: usize,
    /// Marketing dates with no business row (dropped from the output)
    pub unmatched_marketing_dates: usize,
}

/// Left-joins a date-keyed marketing aggregate onto the business series.
///
/// # Arguments
/// * `business` - Business-outcomes rows, the driving side
/// * `daily` - Daily marketing aggregates; partitions with a non-date key are
///   ignored
///
/// # Returns
/// One `CombinedRecord` per business row in input order, with unmatched-date
/// counts on both sides.
pub fn left_join(business: &[BusinessRecord], daily: &[AggregateRecord]) -> JoinOutcome {
    let by_date: HashMap<NaiveDate, &AggregateRecord> = daily
        .iter()
        .filter_map(|a| a.date().map(|d| (d, a)))
        .collect();

    let business_dates: std::collections::HashSet<NaiveDate> =
        business.iter().map(|b| b.date).collect();
    let unmatched_marketing_dates = by_date
        .keys()
        .filter(|date| !business_dates.contains(date))
        .count();

    let mut unmatched_business_dates = 0;
    let rows = business
        .iter()
        .map(|record| {
            let marketing = by_date.get(&record.date).map(|a| MarketingDay {
                impressions: a.impressions,
                clicks: a.clicks,
                spend: a.spend,
                attributed_revenue: a.attributed_revenue,
                metrics: a.metrics,
            });
            if marketing.is_none() {
                unmatched_business_dates += 1;
            }
            combine(record.clone(), marketing)
        })
        .collect();

    JoinOutcome {
        rows,
        unmatched_business_dates,
        unmatched_marketing_dates,
    }
}

/// Derives the post-join ratios for one combined row. Absent inputs yield
/// undefined ratios; nothing is recomputed against zero.
fn combine(business: BusinessRecord, marketing: Option<MarketingDay>) -> CombinedRecord {
    let total_revenue = business.total_revenue;
    let marketing_revenue_share = match &marketing {
        Some(day) => Ratio::of(day.attributed_revenue, total_revenue),
        None => Ratio::Undefined,
    };
    let marketing_spend_ratio = match &marketing {
        Some(day) => Ratio::of(day.spend, total_revenue),
        None => Ratio::Undefined,
    };
    let gross_margin_pct = match business.gross_profit {
        Some(gross_profit) => Ratio::of(gross_profit, total_revenue),
        None => Ratio::Undefined,
    };

    CombinedRecord {
        date: business.date,
        business,
        marketing,
        marketing_revenue_share,
        marketing_spend_ratio,
        gross_margin_pct,
    }
}
