//! Aggregation
//!
//! Groups the unified record set by date, campaign, or channel, sums the four
//! base quantities per partition, and re-derives CTR/CPC/ROAS from the sums.
//! The ratio metrics are always ratio-of-sums; averaging row-level ratios is
//! mathematically wrong under unequal denominators and is rejected by tests.

use crate::channel::Channel;
use crate::metric::{derive_metrics, DerivedMetrics};
use crate::record::RawRecord;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dimension to group the unified record set by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    Date,
    Campaign,
    Channel,
}

/// Key of one aggregate partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    Date(NaiveDate),
    Campaign(String),
    Channel(Channel),
}

impl GroupKey {
    fn for_record(group_by: GroupBy, record: &RawRecord) -> GroupKey {
        match group_by {
            GroupBy::Date => GroupKey::Date(record.date),
            GroupBy::Campaign => GroupKey::Campaign(record.campaign.clone()),
            GroupBy::Channel => GroupKey::Channel(record.channel.clone()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Date(date) => write!(f, "{}", date),
            GroupKey::Campaign(name) => write!(f, "{}", name),
            GroupKey::Channel(channel) => write!(f, "{}", channel),
        }
    }
}

/// One aggregate partition: summed base quantities plus metrics derived from
/// those sums. Produced fresh per aggregation call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// The distinct key value of this partition
    pub key: GroupKey,
    /// Summed impressions
    pub impressions: u64,
    /// Summed clicks
    pub clicks: u64,
    /// Summed spend
    pub spend: f64,
    /// Summed attributed revenue
    pub attributed_revenue: f64,
    /// CTR/CPC/ROAS derived from the sums above
    pub metrics: DerivedMetrics,
}

impl AggregateRecord {
    /// Returns the date key, if this partition was grouped by date.
    pub fn date(&self) -> Option<NaiveDate> {
        match &self.key {
            GroupKey::Date(date) => Some(*date),
            _ => None,
        }
    }
}

/// Accumulator for one partition's base quantities.
#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    impressions: u64,
    clicks: u64,
    spend: f64,
    attributed_revenue: f64,
}

impl Totals {
    fn add(&mut self, record: &RawRecord) {
        self.impressions += record.impressions;
        self.clicks += record.clicks;
        self.spend += record.spend;
        self.attributed_revenue += record.attributed_revenue;
    }
}

/// Groups records by the selected dimension and derives per-partition
/// aggregates.
///
/// # Arguments
/// * `records` - The unified record set (or a filtered view of it)
/// * `group_by` - Grouping dimension
///
/// # Returns
/// One `AggregateRecord` per distinct key value, ordered by first occurrence
/// of each key in the input. Callers wanting display order apply one of the
/// sort helpers afterwards.
pub fn aggregate(records: &[RawRecord], group_by: GroupBy) -> Vec<AggregateRecord> {
    aggregate_filtered(records, group_by, |_| true)
}

/// Groups records as [`aggregate`] does, keeping only records matched by the
/// predicate. The predicate is a read-only view; the record set is never
/// mutated.
pub fn aggregate_filtered<F>(
    records: &[RawRecord],
    group_by: GroupBy,
    mut predicate: F,
) -> Vec<AggregateRecord>
where
    F: FnMut(&RawRecord) -> bool,
{
    let mut order: Vec<GroupKey> = Vec::new();
    let mut totals: HashMap<GroupKey, Totals> = HashMap::new();

    for record in records.iter().filter(|r| predicate(r)) {
        let key = GroupKey::for_record(group_by, record);
        totals
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Totals::default()
            })
            .add(record);
    }

    order
        .into_iter()
        .map(|key| {
            let t = totals[&key];
            AggregateRecord {
                metrics: derive_metrics(t.impressions, t.clicks, t.spend, t.attributed_revenue),
                key,
                impressions: t.impressions,
                clicks: t.clicks,
                spend: t.spend,
                attributed_revenue: t.attributed_revenue,
            }
        })
        .collect()
}

/// Stable-sorts aggregates by spend, descending. For display only.
pub fn sort_by_spend_desc(aggregates: &mut [AggregateRecord]) {
    aggregates.sort_by_key(|a| std::cmp::Reverse(OrderedFloat(a.spend)));
}

/// Stable-sorts aggregates by ROAS, descending. Undefined ROAS sorts last.
pub fn sort_by_roas_desc(aggregates: &mut [AggregateRecord]) {
    aggregates.sort_by_key(|a| {
        std::cmp::Reverse(OrderedFloat(a.metrics.roas.value().unwrap_or(f64::NEG_INFINITY)))
    });
}

/// Returns the top `n` aggregates by ROAS, descending. Undefined ROAS is
/// ranked below every defined value.
pub fn top_by_roas(aggregates: &[AggregateRecord], n: usize) -> Vec<AggregateRecord> {
    let mut sorted = aggregates.to_vec();
    sort_by_roas_desc(&mut sorted);
    sorted.truncate(n);
    sorted
}

/// Returns the top `n` aggregates by spend, descending.
pub fn top_by_spend(aggregates: &[AggregateRecord], n: usize) -> Vec<AggregateRecord> {
    let mut sorted = aggregates.to_vec();
    sort_by_spend_desc(&mut sorted);
    sorted.truncate(n);
    sorted
}

/// Non-fatal warning raised when an aggregation fails to conserve a base
/// quantity against its source set. This catches pipeline bugs, not user
/// data problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationWarning {
    /// Which base quantity failed to reconcile
    pub quantity: String,
    /// Sum over the source record set
    pub source_total: f64,
    /// Sum over the aggregate partitions
    pub aggregate_total: f64,
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Aggregation did not conserve {}: source total {} vs aggregate total {}",
            self.quantity, self.source_total, self.aggregate_total
        )
    }
}

/// Verifies that each base quantity is conserved between a record set and an
/// aggregation of it, within float tolerance.
///
/// # Returns
/// One warning per base quantity whose sums disagree beyond `tolerance`;
/// an empty vector when the aggregation conserves everything.
pub fn verify_conservation(
    records: &[RawRecord],
    aggregates: &[AggregateRecord],
    tolerance: f64,
) -> Vec<ReconciliationWarning> {
    let source = records.iter().fold(Totals::default(), |mut acc, r| {
        acc.add(r);
        acc
    });
    let check = [
        (
            "impressions",
            source.impressions as f64,
            aggregates.iter().map(|a| a.impressions as f64).sum::<f64>(),
        ),
        (
            "clicks",
            source.clicks as f64,
            aggregates.iter().map(|a| a.clicks as f64).sum::<f64>(),
        ),
        (
            "spend",
            source.spend,
            aggregates.iter().map(|a| a.spend).sum::<f64>(),
        ),
        (
            "attributed_revenue",
            source.attributed_revenue,
            aggregates.iter().map(|a| a.attributed_revenue).sum::<f64>(),
        ),
    ];

    check
        .into_iter()
        .filter(|(_, source_total, aggregate_total)| {
            (source_total - aggregate_total).abs() > tolerance
        })
        .map(|(quantity, source_total, aggregate_total)| ReconciliationWarning {
            quantity: quantity.to_string(),
            source_total,
            aggregate_total,
        })
        .collect()
}
