//! Pipeline Orchestration
//!
//! Single-pass batch run over in-memory tables: normalize every channel
//! source, derive and aggregate metrics at three granularities, join the
//! business series, detect spend anomalies, and evaluate the recommendation
//! rules. The run is a pure function of its input and parameters, which is
//! what makes the explicit result cache below sound.

use crate::aggregate::{
    aggregate, verify_conservation, AggregateRecord, GroupBy, ReconciliationWarning,
};
use crate::anomaly::{detect_anomalies, Anomaly, DetectorConfig};
use crate::channel::Channel;
use crate::join::{left_join, JoinOutcome};
use crate::loader::{load_channel_sources, load_source_table, LoadError};
use crate::metric::Ratio;
use crate::normalize::{
    normalize_business, normalize_sources, DataQualityWarning, SchemaError, SourceTable,
};
use crate::record::{BusinessRecord, DateRange, RawRecord};
use crate::recommend::{recommend, Recommendation, RuleConfig};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::info;

/// Everything a pipeline run consumes: one table per channel plus the
/// business-outcomes table.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub sources: Vec<(Channel, SourceTable)>,
    pub business: SourceTable,
}

impl PipelineInput {
    /// Loads the input from CSV files.
    ///
    /// # Errors
    /// Returns a `LoadError` naming the first source that is missing or
    /// unreadable.
    pub fn load(
        channel_paths: &[(Channel, &Path)],
        business_path: &Path,
    ) -> Result<Self, LoadError> {
        Ok(PipelineInput {
            sources: load_channel_sources(channel_paths)?,
            business: load_source_table(business_path)?,
        })
    }
}

/// Run parameters: presentation-driven filters plus the detector and rule
/// configuration. Filters select a view of the unified record set before
/// aggregation; the normalized data itself is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Inclusive date window, or `None` for the full series
    pub date_range: Option<DateRange>,
    /// Channel subset, or `None` for all channels
    pub channels: Option<Vec<Channel>>,
    pub detector: DetectorConfig,
    pub rules: RuleConfig,
}

impl Default for PipelineParams {
    fn default() -> Self {
        PipelineParams {
            date_range: None,
            channels: None,
            detector: DetectorConfig::default(),
            rules: RuleConfig::default(),
        }
    }
}

impl PipelineParams {
    fn matches(&self, record: &RawRecord) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains(record.date) {
                return false;
            }
        }
        if let Some(channels) = &self.channels {
            if !channels.contains(&record.channel) {
                return false;
            }
        }
        true
    }
}

/// Headline totals over the filtered view. The overall ROAS is the ratio of
/// the summed revenue and spend, not a mean of daily ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiTotals {
    pub total_spend: f64,
    pub total_attributed_revenue: f64,
    pub total_business_revenue: f64,
    pub overall_roas: Ratio,
}

/// The full output contract of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// The unified normalized record set, unfiltered
    pub records: Vec<RawRecord>,
    /// Business-outcomes rows, unfiltered
    pub business: Vec<BusinessRecord>,
    /// Aggregates over the filtered view, one per granularity
    pub by_date: Vec<AggregateRecord>,
    pub by_campaign: Vec<AggregateRecord>,
    pub by_channel: Vec<AggregateRecord>,
    /// Business ⨝ daily marketing, with unmatched-date counts
    pub combined: JoinOutcome,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    pub kpis: KpiTotals,
    pub data_quality_warnings: Vec<DataQualityWarning>,
    pub reconciliation_warnings: Vec<ReconciliationWarning>,
}

/// Fatal pipeline errors.
#[derive(Debug)]
pub enum PipelineError {
    /// A source could not be loaded
    Load(LoadError),
    /// A required column is missing from a source
    Schema(SchemaError),
    /// No channel sources were provided
    EmptyInput,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Load(e) => write!(f, "{}", e),
            PipelineError::Schema(e) => write!(f, "{}", e),
            PipelineError::EmptyInput => write!(f, "No channel sources provided"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Load(e) => Some(e),
            PipelineError::Schema(e) => Some(e),
            PipelineError::EmptyInput => None,
        }
    }
}

impl From<LoadError> for PipelineError {
    fn from(e: LoadError) -> Self {
        PipelineError::Load(e)
    }
}

impl From<SchemaError> for PipelineError {
    fn from(e: SchemaError) -> Self {
        PipelineError::Schema(e)
    }
}

/// Float tolerance for the conservation check between an aggregate and its
/// source view.
const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Runs the full pipeline over in-memory input.
///
/// # Errors
/// Returns `EmptyInput` when no channel sources are provided and `Schema`
/// when a required column cannot be resolved. Zero denominators and data
/// quality findings are never errors; they surface in the report.
pub fn run(input: &PipelineInput, params: &PipelineParams) -> Result<PipelineReport, PipelineError> {
    if input.sources.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let (records, mut warnings) = normalize_sources(&input.sources)?;
    let (business, business_warnings) = normalize_business(&input.business)?;
    warnings.extend(business_warnings);

    // Filtered view for aggregation; the normalized sets stay untouched.
    let view: Vec<RawRecord> = records
        .iter()
        .filter(|r| params.matches(r))
        .cloned()
        .collect();
    let business_view: Vec<BusinessRecord> = business
        .iter()
        .filter(|b| match &params.date_range {
            Some(range) => range.contains(b.date),
            None => true,
        })
        .cloned()
        .collect();

    let by_date = aggregate(&view, GroupBy::Date);
    let by_campaign = aggregate(&view, GroupBy::Campaign);
    let by_channel = aggregate(&view, GroupBy::Channel);

    let mut reconciliation_warnings =
        verify_conservation(&view, &by_channel, CONSERVATION_TOLERANCE);
    reconciliation_warnings.extend(verify_conservation(
        &view,
        &by_date,
        CONSERVATION_TOLERANCE,
    ));

    let combined = left_join(&business_view, &by_date);
    let anomalies = detect_anomalies(&by_date, params.detector);
    let recommendations = recommend(
        &by_campaign,
        &by_channel,
        &by_date,
        &anomalies,
        &params.rules,
    );

    let total_spend: f64 = view.iter().map(|r| r.spend).sum();
    let total_attributed_revenue: f64 = view.iter().map(|r| r.attributed_revenue).sum();
    let total_business_revenue: f64 = business_view.iter().map(|b| b.total_revenue).sum();
    let kpis = KpiTotals {
        total_spend,
        total_attributed_revenue,
        total_business_revenue,
        overall_roas: Ratio::of(total_attributed_revenue, total_spend),
    };

    info!(
        records = records.len(),
        filtered = view.len(),
        anomalies = anomalies.len(),
        recommendations = recommendations.len(),
        "pipeline run complete"
    );

    Ok(PipelineReport {
        records,
        business,
        by_date,
        by_campaign,
        by_channel,
        combined,
        anomalies,
        recommendations,
        kpis,
        data_quality_warnings: warnings,
        reconciliation_warnings,
    })
}

/// Explicit result cache for pipeline runs.
///
/// Keyed on a fingerprint of the source identities, source contents, and run
/// parameters, with explicit invalidation. Runs are pure, so a cached report
/// is byte-identical to a fresh one; the cache is an optimization only and
/// holds no hidden process-wide state.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: HashMap<u64, PipelineReport>,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        PipelineCache::default()
    }

    /// Computes the cache fingerprint for an input/params pair.
    pub fn fingerprint(input: &PipelineInput, params: &PipelineParams) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (channel, table) in &input.sources {
            channel.hash(&mut hasher);
            hash_table(table, &mut hasher);
        }
        hash_table(&input.business, &mut hasher);
        if let Some(range) = &params.date_range {
            range.start.hash(&mut hasher);
            range.end.hash(&mut hasher);
        }
        if let Some(channels) = &params.channels {
            channels.hash(&mut hasher);
        }
        params.detector.k.to_bits().hash(&mut hasher);
        params.rules.low_roas_threshold.to_bits().hash(&mut hasher);
        params.rules.scale_up_threshold.to_bits().hash(&mut hasher);
        params.rules.review_threshold.to_bits().hash(&mut hasher);
        params.rules.materiality_floor.to_bits().hash(&mut hasher);
        params
            .rules
            .reallocation_roas_threshold
            .to_bits()
            .hash(&mut hasher);
        params
            .rules
            .reallocation_fraction
            .to_bits()
            .hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the cached report for this input/params pair, running the
    /// pipeline on a miss.
    ///
    /// # Errors
    /// Propagates any error from the underlying run; errors are never cached.
    pub fn get_or_run(
        &mut self,
        input: &PipelineInput,
        params: &PipelineParams,
    ) -> Result<PipelineReport, PipelineError> {
        let key = Self::fingerprint(input, params);
        if let Some(report) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(report.clone());
        }
        self.misses += 1;
        let report = run(input, params)?;
        self.entries.insert(key, report.clone());
        Ok(report)
    }

    /// Drops the cached report for this input/params pair, if any.
    pub fn invalidate(&mut self, input: &PipelineInput, params: &PipelineParams) {
        self.entries.remove(&Self::fingerprint(input, params));
    }

    /// Drops every cached report.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Number of cached reports.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

fn hash_table(table: &SourceTable, hasher: &mut DefaultHasher) {
    table.source.hash(hasher);
    table.columns.hash(hasher);
    table.rows.hash(hasher);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn marketing_table(source: &str, rows: Vec<Vec<String>>) -> SourceTable {
        SourceTable {
            source: source.to_string(),
            columns: vec![
                "date".into(),
                "campaign".into(),
                "impression".into(),
                "clicks".into(),
                "spend".into(),
                "attributed revenue".into(),
            ],
            rows,
        }
    }

    fn row(date: &str, campaign: &str, spend: f64, revenue: f64) -> Vec<String> {
        vec![
            date.to_string(),
            campaign.to_string(),
            "1000".to_string(),
            "100".to_string(),
            spend.to_string(),
            revenue.to_string(),
        ]
    }

    fn business_table(rows: Vec<Vec<String>>) -> SourceTable {
        SourceTable {
            source: "Business.csv".to_string(),
            columns: vec!["date".into(), "total revenue".into(), "gross profit".into()],
            rows,
        }
    }

    fn sample_input() -> PipelineInput {
        PipelineInput {
            sources: vec![
                (
                    Channel::Facebook,
                    marketing_table(
                        "Facebook.csv",
                        vec![
                            row("2024-06-01", "FB Launch", 100.0, 180.0),
                            row("2024-06-02", "FB Launch", 120.0, 200.0),
                        ],
                    ),
                ),
                (
                    Channel::Google,
                    marketing_table(
                        "Google.csv",
                        vec![row("2024-06-01", "Search Brand", 80.0, 260.0)],
                    ),
                ),
            ],
            business: business_table(vec![
                vec!["2024-06-01".into(), "2000".into(), "800".into()],
                vec!["2024-06-02".into(), "1500".into(), "600".into()],
                vec!["2024-06-03".into(), "1800".into(), "700".into()],
            ]),
        }
    }

    #[test]
    fn test_run_produces_full_output_contract() {
        let report = run(&sample_input(), &PipelineParams::default()).unwrap();
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.by_date.len(), 2);
        assert_eq!(report.by_campaign.len(), 2);
        assert_eq!(report.by_channel.len(), 2);
        assert_eq!(report.combined.rows.len(), 3);
        assert_eq!(report.combined.unmatched_business_dates, 1); // 2024-06-03
        assert_eq!(report.combined.unmatched_marketing_dates, 0);
        assert!(report.reconciliation_warnings.is_empty());
        assert_eq!(report.kpis.total_spend, 300.0);
        assert_eq!(report.kpis.total_attributed_revenue, 640.0);
        assert_eq!(report.kpis.overall_roas.value(), Some(640.0 / 300.0));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let input = PipelineInput {
            sources: vec![],
            business: business_table(vec![]),
        };
        assert!(matches!(
            run(&input, &PipelineParams::default()),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn test_schema_error_propagates_with_source_identity() {
        let mut input = sample_input();
        input.sources[1].1.columns.retain(|c| c != "spend");
        let err = run(&input, &PipelineParams::default()).unwrap_err();
        match err {
            PipelineError::Schema(e) => {
                assert_eq!(e.column, "spend");
                assert_eq!(e.source, "Google.csv");
            }
            other => panic!("expected Schema, got {:?}", other),
        }
    }

    #[test]
    fn test_date_filter_is_a_view_not_a_mutation() {
        let params = PipelineParams {
            date_range: Some(DateRange::new(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            )),
            ..PipelineParams::default()
        };
        let report = run(&sample_input(), &params).unwrap();
        // The unified set keeps all records; only the aggregates narrow.
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.by_date.len(), 1);
        assert_eq!(report.kpis.total_spend, 180.0);
        assert_eq!(report.combined.rows.len(), 1);
    }

    #[test]
    fn test_channel_filter() {
        let params = PipelineParams {
            channels: Some(vec![Channel::Google]),
            ..PipelineParams::default()
        };
        let report = run(&sample_input(), &params).unwrap();
        assert_eq!(report.by_channel.len(), 1);
        assert_eq!(report.kpis.total_spend, 80.0);
    }

    #[test]
    fn test_cache_hit_returns_identical_report() {
        let input = sample_input();
        let params = PipelineParams::default();
        let mut cache = PipelineCache::new();

        let first = cache.get_or_run(&input, &params).unwrap();
        let second = cache.get_or_run(&input, &params).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinguishes_params() {
        let input = sample_input();
        let mut cache = PipelineCache::new();
        cache.get_or_run(&input, &PipelineParams::default()).unwrap();
        let narrowed = PipelineParams {
            channels: Some(vec![Channel::Facebook]),
            ..PipelineParams::default()
        };
        cache.get_or_run(&input, &narrowed).unwrap();
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_invalidation_forces_fresh_run() {
        let input = sample_input();
        let params = PipelineParams::default();
        let mut cache = PipelineCache::new();
        cache.get_or_run(&input, &params).unwrap();
        cache.invalidate(&input, &params);
        assert!(cache.is_empty());
        cache.get_or_run(&input, &params).unwrap();
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_modified_source_changes_fingerprint() {
        let input = sample_input();
        let params = PipelineParams::default();
        let original = PipelineCache::fingerprint(&input, &params);
        let mut modified = input.clone();
        modified.sources[0].1.rows[0][4] = "999.0".to_string();
        assert_ne!(original, PipelineCache::fingerprint(&modified, &params));
    }
}
