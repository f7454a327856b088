//! Typed requests and results for the performance store.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::entities::Sex;

/// Performance metric families stored in the metrics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Weight,
    DailyGain,
    Fcr,
    Mortality,
    FeedIntake,
    WaterIntake,
}

impl MetricKind {
    /// Prefix used in `metric_name LIKE '<prefix> for %'` patterns.
    pub fn sql_pattern_prefix(&self) -> &'static str {
        match self {
            Self::Weight => "body_weight",
            Self::DailyGain => "daily_gain",
            Self::Fcr => "feed_conversion_ratio",
            Self::Mortality => "mortality",
            Self::FeedIntake => "feed_intake",
            Self::WaterIntake => "water_intake",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::DailyGain => "daily_gain",
            Self::Fcr => "fcr",
            Self::Mortality => "mortality",
            Self::FeedIntake => "feed_intake",
            Self::WaterIntake => "water_intake",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Weight => "g",
            Self::DailyGain => "g/day",
            Self::Fcr => "ratio",
            Self::Mortality => "%",
            Self::FeedIntake => "g",
            Self::WaterIntake => "ml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgeRange {
    pub min_days: u32,
    pub max_days: u32,
}

/// Typed lookup request. All fields optional; a wider query returns more rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PerfQuery {
    pub species: Option<String>,
    pub line: Option<String>,
    pub sex: Option<Sex>,
    pub age_days: Option<u32>,
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub metrics: Vec<MetricKind>,
}

/// One row of the performance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PerfRow {
    pub line: String,
    pub sex: String,
    pub age_days: u32,
    pub metric: MetricKind,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PerfResult {
    pub rows: Vec<PerfRow>,
    /// Derived from row count and filter specificity.
    pub confidence: f64,
}

impl PerfResult {
    /// `min(1.0, 0.2 + 0.1 * min(rows, 8))`
    pub fn confidence_for_rows(rows: usize) -> f64 {
        (0.2 + 0.1 * rows.min(8) as f64).min(1.0)
    }
}

/// Summary of what the store can actually answer, used by the CLARIFY route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfCatalog {
    pub species: Vec<String>,
    pub lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_saturates_at_eight_rows() {
        assert!((PerfResult::confidence_for_rows(0) - 0.2).abs() < 1e-9);
        assert!((PerfResult::confidence_for_rows(3) - 0.5).abs() < 1e-9);
        assert!((PerfResult::confidence_for_rows(8) - 1.0).abs() < 1e-9);
        assert!((PerfResult::confidence_for_rows(50) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn metric_sql_prefixes_are_stable() {
        assert_eq!(MetricKind::Weight.sql_pattern_prefix(), "body_weight");
        assert_eq!(MetricKind::Fcr.sql_pattern_prefix(), "feed_conversion_ratio");
    }
}
