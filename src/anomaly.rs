//! Spend Anomaly Detection
//!
//! Flags days whose spend lies outside a mean ± k·sigma band computed over
//! the daily aggregate series. Thresholds are recomputed fresh on every
//! invocation; nothing is persisted or adapted online.

use crate::aggregate::AggregateRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which side of the band a flagged day fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
}

/// One flagged day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub observed_spend: f64,
    /// The band edge the observation crossed
    pub threshold: f64,
    pub direction: Direction,
}

/// The spend band computed for one detector invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendBand {
    pub mean: f64,
    /// Sample standard deviation (n-1 estimator)
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Detector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Band width multiplier applied to the sample standard deviation
    pub k: f64,
}

impl Default for DetectorConfig {
    /// Default band width is mean ± 3σ, matching typical spend-spike
    /// monitoring practice.
    fn default() -> Self {
        DetectorConfig { k: 3.0 }
    }
}

/// Computes sample mean and sample (n-1) standard deviation of a series.
/// Returns `None` for series shorter than two points.
fn sample_stats(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_squared_diff: f64 = values.iter().map(|&v| (v - mean).powi(2)).sum();
    let std_dev = (sum_squared_diff / (n - 1.0)).sqrt();
    Some((mean, std_dev))
}

/// Computes the spend band for a daily series, or `None` when the series is
/// too short or has zero variance (in which case no day is anomalous).
pub fn spend_band(daily: &[AggregateRecord], config: DetectorConfig) -> Option<SpendBand> {
    let spends: Vec<f64> = daily.iter().map(|a| a.spend).collect();
    let (mean, std_dev) = sample_stats(&spends)?;
    if std_dev == 0.0 {
        return None;
    }
    Some(SpendBand {
        mean,
        std_dev,
        lower: (mean - config.k * std_dev).max(0.0),
        upper: mean + config.k * std_dev,
    })
}

/// Flags every day in the daily series whose spend lies outside the band.
///
/// # Arguments
/// * `daily` - Daily aggregate series (partitions with non-date keys are
///   ignored)
/// * `config` - Band width multiplier
///
/// # Returns
/// Flagged days in series order. A series with fewer than two days, or with
/// zero spend variance, yields no anomalies rather than flagging everything.
pub fn detect_anomalies(daily: &[AggregateRecord], config: DetectorConfig) -> Vec<Anomaly> {
    let band = match spend_band(daily, config) {
        Some(band) => band,
        None => return Vec::new(),
    };

    let anomalies: Vec<Anomaly> = daily
        .iter()
        .filter_map(|aggregate| {
            let date = aggregate.date()?;
            if aggregate.spend > band.upper {
                Some(Anomaly {
                    date,
                    observed_spend: aggregate.spend,
                    threshold: band.upper,
                    direction: Direction::High,
                })
            } else if aggregate.spend < band.lower {
                Some(Anomaly {
                    date,
                    observed_spend: aggregate.spend,
                    threshold: band.lower,
                    direction: Direction::Low,
                })
            } else {
                None
            }
        })
        .collect();

    debug!(
        days = daily.len(),
        k = config.k,
        flagged = anomalies.len(),
        "spend anomaly detection complete"
    );
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, GroupBy};
    use crate::channel::Channel;
    use crate::record::RawRecord;

    fn daily_series(spends: &[f64]) -> Vec<AggregateRecord> {
        let records: Vec<RawRecord> = spends
            .iter()
            .enumerate()
            .map(|(i, &spend)| RawRecord {
                date: NaiveDate::from_ymd_opt(2024, 6, (i + 1) as u32).unwrap(),
                campaign: "A".to_string(),
                channel: Channel::Facebook,
                impressions: 100,
                clicks: 10,
                spend,
                attributed_revenue: spend * 1.2,
            })
            .collect();
        aggregate(&records, GroupBy::Date)
    }

    #[test]
    fn test_injected_outlier_is_the_only_flag() {
        // Nine days near 100 (within ±1σ of each other), one at roughly
        // μ + 5σ. With k = 2.5 only the injected day is flagged.
        let mut spends = vec![99.0, 101.0, 100.0, 98.0, 102.0, 100.0, 99.5, 100.5, 101.5];
        spends.push(600.0);
        let daily = daily_series(&spends);

        let anomalies = detect_anomalies(&daily, DetectorConfig { k: 2.5 });
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(anomalies[0].direction, Direction::High);
        assert_eq!(anomalies[0].observed_spend, 600.0);
    }

    #[test]
    fn test_low_outlier_direction() {
        let spends = vec![100.0, 101.0, 99.0, 100.5, 99.5, 100.0, 101.5, 98.5, 100.0, 2.0];
        let daily = daily_series(&spends);
        let anomalies = detect_anomalies(&daily, DetectorConfig { k: 2.5 });
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].direction, Direction::Low);
    }

    #[test]
    fn test_short_series_yields_no_anomalies() {
        let daily = daily_series(&[100.0]);
        assert!(detect_anomalies(&daily, DetectorConfig::default()).is_empty());
        assert!(detect_anomalies(&[], DetectorConfig::default()).is_empty());
    }

    #[test]
    fn test_zero_variance_yields_no_anomalies() {
        let daily = daily_series(&[100.0; 10]);
        assert!(detect_anomalies(&daily, DetectorConfig::default()).is_empty());
    }

    #[test]
    fn test_lower_band_clamped_at_zero() {
        let daily = daily_series(&[1.0, 5.0, 9.0]);
        let band = spend_band(&daily, DetectorConfig { k: 3.0 }).unwrap();
        assert_eq!(band.lower, 0.0);
        assert!(band.upper > band.mean);
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        let (mean, std_dev) = sample_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(mean, 5.0);
        // Sum of squared diffs is 32; sample variance 32/7.
        assert!((std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }
}
