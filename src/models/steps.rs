//! Typed multi-step decomposition DAG.
//!
//! Each step type carries its own parameter struct and produces a typed
//! result; no untyped maps cross the orchestrator boundary.

use serde::{Deserialize, Serialize};

use super::entities::{FeedBase, Sex};
use super::perf::MetricKind;
use crate::utils::CoreError;

/// Closed set of step types the orchestrator can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    BasePerformance,
    FlockCalculationWithMortality,
    BaseScenario,
    ModifiedScenario,
    ScenarioComparison,
    MetricCalculation,
    AggregateResults,
    SingleOptimization,
    MultiObjectiveCompromise,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasePerformance => "base_performance",
            Self::FlockCalculationWithMortality => "flock_calculation_with_mortality",
            Self::BaseScenario => "base_scenario",
            Self::ModifiedScenario => "modified_scenario",
            Self::ScenarioComparison => "scenario_comparison",
            Self::MetricCalculation => "metric_calculation",
            Self::AggregateResults => "aggregate_results",
            Self::SingleOptimization => "single_optimization",
            Self::MultiObjectiveCompromise => "multi_objective_compromise",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub breed: String,
    pub sex: Sex,
    pub age_days: u32,
    pub flock_size: u32,
    pub mortality_pct: f64,
    pub temperature_c: Option<f64>,
    pub density_per_m2: Option<u32>,
    pub antibiotic_free: Option<bool>,
    pub feed_base: Option<FeedBase>,
}

/// Bounds parsed from the question for optimization steps.
///
/// Only bounds the age scan can actually enforce are represented: weight,
/// FCR and average daily gain are read off each candidate age's per-bird
/// performance, and the age bounds shape the scan window itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConstraints {
    pub min_weight_g: Option<f64>,
    pub max_weight_g: Option<f64>,
    pub min_fcr: Option<f64>,
    pub max_fcr: Option<f64>,
    pub min_daily_gain_g: Option<f64>,
    pub max_daily_gain_g: Option<f64>,
    pub min_age_days: Option<u32>,
    pub max_age_days: Option<u32>,
}

/// Parameters, one variant per step type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepParams {
    BasePerformance { breed: String, sex: Sex, age_days: u32 },
    FlockMortality { flock_size: u32, mortality_pct: f64 },
    Scenario(ScenarioParams),
    ScenarioComparison,
    Metric { metric: MetricKind, scenario: ScenarioParams },
    Aggregate,
    Optimization {
        breed: String,
        sex: Sex,
        objective: MetricKind,
        constraints: OptimizationConstraints,
    },
    Compromise { objectives: Vec<MetricKind> },
}

/// Node in the decomposition DAG. Every dependency references a strictly
/// smaller step number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStep {
    pub step_number: u32,
    pub description: String,
    pub step_type: StepType,
    pub params: StepParams,
    pub dependencies: Vec<u32>,
}

/// Per-bird reference performance fetched from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BasePerformance {
    pub weight_g: f64,
    pub fcr: f64,
    pub intake_g: f64,
}

/// Flock totals after mortality adjustment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlockTotals {
    pub flock_size_initial: u32,
    pub surviving_birds: u32,
    pub dead_birds: u32,
    pub mortality_pct: f64,
    pub total_live_weight_kg: f64,
    pub total_feed_consumed_kg: f64,
    pub avg_fcr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioComparison {
    pub base: FlockTotals,
    pub modified: FlockTotals,
    pub weight_diff_kg: f64,
    pub feed_diff_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric: MetricKind,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub metrics: Vec<MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub objective: MetricKind,
    pub optimal_age_days: u32,
    pub value_at_optimum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompromiseOutcome {
    pub compromise_age_days: u32,
    pub individual_optimals: Vec<OptimizationOutcome>,
}

/// Typed result of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepResult {
    Performance(BasePerformance),
    FlockTotals(FlockTotals),
    Comparison(ScenarioComparison),
    Metric(MetricValue),
    Aggregate(AggregateSummary),
    Optimization(OptimizationOutcome),
    Compromise(CompromiseOutcome),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub step_number: u32,
    pub step_type: StepType,
    pub result: StepResult,
}

/// Outcome of a full orchestration. `final_result` is the output of the
/// DAG's terminal node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub steps_executed: u32,
    pub results: Vec<ExecutedStep>,
    pub final_result: Option<StepResult>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Reject DAGs where a dependency does not reference an earlier step. Valid
/// decompositions are acyclic by construction of this ordering.
pub fn validate_dag(steps: &[QueryStep]) -> Result<(), CoreError> {
    for step in steps {
        for dep in &step.dependencies {
            if *dep >= step.step_number {
                return Err(CoreError::DependencyUnsatisfied {
                    step: step.step_number,
                    missing: *dep,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, deps: Vec<u32>) -> QueryStep {
        QueryStep {
            step_number: n,
            description: String::new(),
            step_type: StepType::AggregateResults,
            params: StepParams::Aggregate,
            dependencies: deps,
        }
    }

    #[test]
    fn forward_dependencies_are_rejected() {
        assert!(validate_dag(&[step(1, vec![]), step(2, vec![1])]).is_ok());
        assert!(validate_dag(&[step(1, vec![2]), step(2, vec![])]).is_err());
        assert!(validate_dag(&[step(1, vec![1])]).is_err());
    }
}
