//! Metric Derivation
//!
//! This module provides the null-safe ratio type and the standard marketing
//! efficiency metrics (CTR, CPC, ROAS). A ratio over a zero denominator is an
//! explicit `Undefined` value rather than an exception, an infinity, or a
//! silent zero; callers must branch on definedness before formatting or
//! comparing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ratio that is either a finite number or explicitly undefined.
///
/// `Undefined` propagates through aggregation and display instead of
/// participating in arithmetic as a sentinel. Serializes as `Option<f64>`
/// (`null` for undefined).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "Option<f64>", from = "Option<f64>")]
pub enum Ratio {
    /// A finite ratio value
    Defined(f64),
    /// Denominator was zero (or an input was non-finite)
    Undefined,
}

impl Ratio {
    /// Computes `numerator / denominator` null-safely.
    ///
    /// # Returns
    /// `Defined` when the denominator is non-zero and both inputs are finite,
    /// `Undefined` otherwise. Never panics and never yields infinity or NaN.
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !numerator.is_finite() || !denominator.is_finite() {
            return Ratio::Undefined;
        }
        Ratio::Defined(numerator / denominator)
    }

    /// Returns true if the ratio carries a value.
    pub fn is_defined(&self) -> bool {
        matches!(self, Ratio::Defined(_))
    }

    /// Returns the value, or `None` when undefined.
    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    /// Returns true if the ratio is defined and strictly below `threshold`.
    ///
    /// An undefined ratio is never below (or above) anything; threshold rules
    /// must not fire on missing data.
    pub fn is_below(&self, threshold: f64) -> bool {
        matches!(self, Ratio::Defined(v) if *v < threshold)
    }

    /// Returns true if the ratio is defined and strictly above `threshold`.
    pub fn is_above(&self, threshold: f64) -> bool {
        matches!(self, Ratio::Defined(v) if *v > threshold)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{:.4}", v),
            Ratio::Undefined => write!(f, "n/a"),
        }
    }
}

impl From<Ratio> for Option<f64> {
    fn from(ratio: Ratio) -> Option<f64> {
        ratio.value()
    }
}

impl From<Option<f64>> for Ratio {
    fn from(value: Option<f64>) -> Ratio {
        match value {
            Some(v) if v.is_finite() => Ratio::Defined(v),
            _ => Ratio::Undefined,
        }
    }
}

/// The three derived efficiency metrics for a record or an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Click-through rate: clicks / impressions
    pub ctr: Ratio,
    /// Cost per click: spend / clicks
    pub cpc: Ratio,
    /// Return on ad spend: attributed_revenue / spend
    pub roas: Ratio,
}

/// Derives CTR, CPC, and ROAS from the four base quantities.
///
/// At aggregate granularity the inputs must be the SUMMED base quantities of
/// the partition; deriving from sums is what keeps the ratios correct under
/// unequal denominators (an average of row-level ratios is not).
///
/// # Arguments
/// * `impressions` - Impressions served
/// * `clicks` - Clicks received
/// * `spend` - Media spend
/// * `attributed_revenue` - Revenue attributed by the measurement model
pub fn derive_metrics(
    impressions: u64,
    clicks: u64,
    spend: f64,
    attributed_revenue: f64,
) -> DerivedMetrics {
    DerivedMetrics {
        ctr: Ratio::of(clicks as f64, impressions as f64),
        cpc: Ratio::of(spend, clicks as f64),
        roas: Ratio::of(attributed_revenue, spend),
    }
}
