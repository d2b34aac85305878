//! Rule-Based Recommendations
//!
//! Turns the aggregate views and the anomaly list into deterministic textual
//! findings. Every rule is independently evaluable and emits zero or more
//! recommendations; output order is rule order, then input order. An
//! undefined ROAS never trips a threshold rule.

use crate::aggregate::AggregateRecord;
use crate::anomaly::{Anomaly, Direction};
use crate::channel::Channel;
use crate::metric::Ratio;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What a finding is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Subject {
    Campaign(String),
    Channel(Channel),
    Date(NaiveDate),
    /// Findings spanning several campaigns (e.g. a reallocation estimate)
    Portfolio,
}

/// One rule finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub subject: Subject,
    pub message: String,
    /// The metric value the rule fired on, for display next to the message
    pub supporting_metric: Ratio,
}

/// Thresholds, floors, and fractions for the rule set. Defaults match the
/// documented contract; none of them is inlined at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Campaigns with ROAS below this are pause/optimize candidates (default 0.5)
    pub low_roas_threshold: f64,
    /// The best channel must clear this ROAS to earn a budget increase (default 1.5)
    pub scale_up_threshold: f64,
    /// The worst channel below this ROAS earns an optimization review (default 0.8)
    pub review_threshold: f64,
    /// Campaign spend must reach this floor to be a reallocation candidate (default 100)
    pub materiality_floor: f64,
    /// Material campaigns below this ROAS are reallocation candidates (default 0.8)
    pub reallocation_roas_threshold: f64,
    /// Fraction of combined candidate spend reported as reallocatable (default 0.5)
    pub reallocation_fraction: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig {
            low_roas_threshold: 0.5,
            scale_up_threshold: 1.5,
            review_threshold: 0.8,
            materiality_floor: 100.0,
            reallocation_roas_threshold: 0.8,
            reallocation_fraction: 0.5,
        }
    }
}

/// Evaluates the full rule set.
///
/// # Arguments
/// * `campaigns` - By-campaign aggregates
/// * `channels` - By-channel aggregates
/// * `daily` - By-date aggregates, used to cite same-day ROAS for spikes
/// * `anomalies` - Detector output over the same daily series
/// * `config` - Rule thresholds
pub fn recommend(
    campaigns: &[AggregateRecord],
    channels: &[AggregateRecord],
    daily: &[AggregateRecord],
    anomalies: &[Anomaly],
    config: &RuleConfig,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    low_roas_campaigns(campaigns, config, &mut out);
    spend_spikes(anomalies, daily, &mut out);
    best_channel(channels, config, &mut out);
    worst_channel(channels, config, &mut out);
    reallocation_candidates(campaigns, config, &mut out);
    out
}

/// Rule: any campaign with ROAS below the low threshold should be paused or
/// optimized.
fn low_roas_campaigns(
    campaigns: &[AggregateRecord],
    config: &RuleConfig,
    out: &mut Vec<Recommendation>,
) {
    for campaign in campaigns {
        if campaign.metrics.roas.is_below(config.low_roas_threshold) {
            out.push(Recommendation {
                severity: Severity::Critical,
                subject: Subject::Campaign(campaign.key.to_string()),
                message: format!(
                    "Campaign '{}' has ROAS {} on spend {:.2}; pause or optimize, it is not cost-effective",
                    campaign.key, campaign.metrics.roas, campaign.spend
                ),
                supporting_metric: campaign.metrics.roas,
            });
        }
    }
}

/// Rule: every high-side spend anomaly warrants an investigation, citing the
/// same-day ROAS when the daily series has it.
fn spend_spikes(anomalies: &[Anomaly], daily: &[AggregateRecord], out: &mut Vec<Recommendation>) {
    for anomaly in anomalies {
        if anomaly.direction != Direction::High {
            continue;
        }
        let same_day_roas = daily
            .iter()
            .find(|a| a.date() == Some(anomaly.date))
            .map(|a| a.metrics.roas)
            .unwrap_or(Ratio::Undefined);
        out.push(Recommendation {
            severity: Severity::Warning,
            subject: Subject::Date(anomaly.date),
            message: format!(
                "Spend spike on {}: observed {:.2} against threshold {:.2} (same-day ROAS {}); investigate possible overspend or tracking error",
                anomaly.date, anomaly.observed_spend, anomaly.threshold, same_day_roas
            ),
            supporting_metric: same_day_roas,
        });
    }
}

/// Rule: the channel with the highest defined ROAS, if above the scale-up
/// threshold, earns a budget increase.
fn best_channel(channels: &[AggregateRecord], config: &RuleConfig, out: &mut Vec<Recommendation>) {
    let best = channels
        .iter()
        .filter(|c| c.metrics.roas.is_defined())
        .max_by_key(|c| OrderedFloat(c.metrics.roas.value().unwrap_or(f64::NEG_INFINITY)));
    if let Some(channel) = best {
        if channel.metrics.roas.is_above(config.scale_up_threshold) {
            out.push(Recommendation {
                severity: Severity::Info,
                subject: Subject::Channel(channel_of(channel)),
                message: format!(
                    "Channel '{}' leads with ROAS {}; consider increasing its budget",
                    channel.key, channel.metrics.roas
                ),
                supporting_metric: channel.metrics.roas,
            });
        }
    }
}

/// Rule: the channel with the lowest defined ROAS, if below the review
/// threshold, earns an optimization review.
fn worst_channel(channels: &[AggregateRecord], config: &RuleConfig, out: &mut Vec<Recommendation>) {
    let worst = channels
        .iter()
        .filter(|c| c.metrics.roas.is_defined())
        .min_by_key(|c| OrderedFloat(c.metrics.roas.value().unwrap_or(f64::INFINITY)));
    if let Some(channel) = worst {
        if channel.metrics.roas.is_below(config.review_threshold) {
            out.push(Recommendation {
                severity: Severity::Warning,
                subject: Subject::Channel(channel_of(channel)),
                message: format!(
                    "Channel '{}' trails with ROAS {}; review targeting and creative before spending further",
                    channel.key, channel.metrics.roas
                ),
                supporting_metric: channel.metrics.roas,
            });
        }
    }
}

/// Rule: campaigns with material spend and sub-threshold ROAS are
/// reallocation candidates; report the estimated reallocatable amount as a
/// fixed fraction of their combined spend.
fn reallocation_candidates(
    campaigns: &[AggregateRecord],
    config: &RuleConfig,
    out: &mut Vec<Recommendation>,
) {
    let candidates: Vec<&AggregateRecord> = campaigns
        .iter()
        .filter(|c| {
            c.spend > config.materiality_floor
                && c.metrics.roas.is_below(config.reallocation_roas_threshold)
        })
        .collect();
    if candidates.is_empty() {
        return;
    }
    let combined_spend: f64 = candidates.iter().map(|c| c.spend).sum();
    let reallocatable = combined_spend * config.reallocation_fraction;
    let names: Vec<String> = candidates.iter().map(|c| c.key.to_string()).collect();
    out.push(Recommendation {
        severity: Severity::Warning,
        subject: Subject::Portfolio,
        message: format!(
            "{} campaign(s) with material spend and weak ROAS ({}); an estimated {:.2} of their combined {:.2} spend could be reallocated",
            candidates.len(),
            names.join(", "),
            reallocatable,
            combined_spend
        ),
        supporting_metric: Ratio::Defined(reallocatable),
    });
}

fn channel_of(aggregate: &AggregateRecord) -> Channel {
    match &aggregate.key {
        crate::aggregate::GroupKey::Channel(channel) => channel.clone(),
        other => Channel::Other(other.to_string()),
    }
}
