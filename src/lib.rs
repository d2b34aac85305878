pub mod channel;
pub mod record;
pub mod metric;
pub mod normalize;
pub mod aggregate;
pub mod join;
pub mod anomaly;
pub mod recommend;
pub mod loader;
pub mod pipeline;

#[cfg(test)]
mod integration_tests;

pub use channel::{Channel, ChannelParseError};
pub use record::{BusinessRecord, DateRange, RawRecord};
pub use metric::{derive_metrics, DerivedMetrics, Ratio};
pub use normalize::{
    normalize_business, normalize_source, normalize_sources, DataQualityWarning, NormalizedSource,
    SchemaError, SourceTable,
};
pub use aggregate::{
    aggregate, aggregate_filtered, sort_by_roas_desc, sort_by_spend_desc, top_by_roas,
    top_by_spend, verify_conservation, AggregateRecord, GroupBy, GroupKey, ReconciliationWarning,
};
pub use join::{left_join, CombinedRecord, JoinOutcome, MarketingDay};
pub use anomaly::{detect_anomalies, spend_band, Anomaly, DetectorConfig, Direction, SpendBand};
pub use recommend::{recommend, Recommendation, RuleConfig, Severity, Subject};
pub use loader::{load_channel_sources, load_source_table, LoadError};
pub use pipeline::{
    run, KpiTotals, PipelineCache, PipelineError, PipelineInput, PipelineParams, PipelineReport,
};
