use crate::channel::Channel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single normalized advertising performance row.
///
/// One record describes one campaign on one channel on one date. Records are
/// produced by the normalizer and never mutated afterwards; every downstream
/// view (aggregate, join, anomaly) is derived fresh from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Calendar date of the activity
    pub date: NaiveDate,
    /// Campaign name as reported by the platform
    pub campaign: String,
    /// Platform the row was ingested from
    pub channel: Channel,
    /// Ad impressions served
    pub impressions: u64,
    /// Clicks received
    pub clicks: u64,
    /// Media spend in account currency
    pub spend: f64,
    /// Revenue attributed to this campaign by the measurement model
    pub attributed_revenue: f64,
}

/// A single business-outcomes row, one per calendar date.
///
/// `total_revenue` is always present; the remaining KPIs are optional because
/// the business export shipped to the pipeline may strip columns. Ratios that
/// depend on an absent column are undefined rather than recomputed against
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    /// Calendar date of the outcomes
    pub date: NaiveDate,
    /// Total business revenue for the date
    pub total_revenue: f64,
    /// Gross profit, when the export carries it
    pub gross_profit: Option<f64>,
    /// Cost of goods sold, when the export carries it
    pub cogs: Option<f64>,
    /// Order count, when the export carries it
    pub orders: Option<u64>,
    /// New-customer order count, when the export carries it
    pub new_orders: Option<u64>,
    /// New customers acquired, when the export carries it
    pub new_customers: Option<u64>,
}

/// Inclusive date window used to filter the unified record set before
/// aggregation. Filtering is a view over the records; the normalized data is
/// never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Returns true if the date falls inside the window (inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_date_range_contains_is_inclusive() {
        let range = DateRange::new(day(10), day(20));
        assert!(range.contains(day(10)));
        assert!(range.contains(day(15)));
        assert!(range.contains(day(20)));
        assert!(!range.contains(day(9)));
        assert!(!range.contains(day(21)));
    }

    #[test]
    fn test_raw_record_immutability_via_clone() {
        let record = RawRecord {
            date: day(1),
            campaign: "Summer Sale".to_string(),
            channel: Channel::Facebook,
            impressions: 1000,
            clicks: 50,
            spend: 25.0,
            attributed_revenue: 80.0,
        };
        let copy = record.clone();
        assert_eq!(record, copy);
    }
}
