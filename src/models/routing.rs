//! Route decisions produced by the concept router.

use serde::{Deserialize, Serialize};

use super::entities::Sex;
use super::perf::MetricKind;

/// Retrieval route for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRoute {
    /// Deterministic lookup in the performance store.
    PerfStore,
    /// Embedding-based contextual retrieval.
    Vector,
    /// Both, fused.
    Hybrid,
    /// The question is too ambiguous to route.
    Clarify,
}

impl QueryRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerfStore => "perf_store",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Clarify => "clarify",
        }
    }
}

/// Per-category concept scores in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptScores {
    pub performance: f64,
    pub nutrition: f64,
    pub health: f64,
    pub management: f64,
    pub species_specific: f64,
    pub line_specific: f64,
    pub quantitative: f64,
    pub comparison: f64,
}

impl ConceptScores {
    pub fn max(&self) -> f64 {
        [
            self.performance,
            self.nutrition,
            self.health,
            self.management,
            self.species_specific,
            self.line_specific,
            self.quantitative,
            self.comparison,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

/// Structured filters derived from entities, applied to both stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub species: Option<String>,
    pub line: Option<String>,
    pub sex: Option<Sex>,
    pub age_days: Option<u32>,
    #[serde(default)]
    pub metrics: Vec<MetricKind>,
}

/// Output of the router: where to search and with what filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub route: QueryRoute,
    pub confidence: f64,
    pub concepts: ConceptScores,
    pub filters: QueryFilters,
    pub reasoning: String,
}
