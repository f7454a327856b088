//! Multi-step orchestrator.
//!
//! Decomposes complex questions into a typed step DAG and executes it
//! strictly serially in ascending step number. Dependencies must reference
//! earlier steps; a step whose dependency produced no result is skipped and
//! the orchestration completes with partial results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    AggregateSummary, BasePerformance, CompromiseOutcome, ExecutedStep, ExtractedEntities,
    FeedBase, FlockTotals, MetricKind, MetricValue, OptimizationConstraints, OptimizationOutcome,
    OrchestrationResult, QueryStep, ScenarioComparison, ScenarioParams, Sex, StepParams,
    StepResult, StepType, validate_dag,
};
use crate::services::perf_store::PerfStore;
use crate::utils::CoreError;

const DEFAULT_FLOCK_SIZE: u32 = 1000;
const DEFAULT_AGE_DAYS: u32 = 42;
/// Age scan window for optimization steps, in days.
const OPTIMIZATION_MIN_AGE: u32 = 21;
const OPTIMIZATION_MAX_AGE: u32 = 56;
const OPTIMIZATION_AGE_STEP: usize = 7;

static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:[ ,]\d{3})+|\d+)\b").expect("number regex"));
static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent regex"));
static RE_BREED_CHANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:avec|pour|utilise[rz]?|change[rz]?\s+(?:par|pour)|replace\s+with|switch\s+to|with)\s+((?:ross|cobb|hubbard)\s*\d{0,3})",
    )
    .expect("breed change regex")
});
static RE_AGE_DAYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3})\s*(?:jours?|days?|j\b)").expect("age days regex"));
static RE_AGE_WEEKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:semaine|week)s?\s*(\d{1,2})|(\d{1,2})\s*(?:semaines?|weeks?)").expect("age weeks regex"));
static RE_TEMPERATURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*°\s*c").expect("temperature regex"));
static RE_DENSITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s*(?:oiseaux|poulets|birds)?\s*(?:par|per|/)\s*m").expect("density regex")
});

pub struct MultiStepOrchestrator {
    perf_store: Arc<PerfStore>,
}

impl MultiStepOrchestrator {
    pub fn new(perf_store: Arc<PerfStore>) -> Self {
        Self { perf_store }
    }

    /// Whether the question carries one of the dependency-shaped patterns
    /// this orchestrator exists for.
    pub fn has_dependency_pattern(query: &str) -> bool {
        decomposition_kind(query).is_some()
    }

    /// Decompose a question into a step DAG. Falls back to a single
    /// base-performance step when no multi-step pattern matches.
    pub fn decompose(&self, query: &str, entities: &ExtractedEntities) -> Vec<QueryStep> {
        let lowered = crate::utils::strip_diacritics(&query.to_lowercase());

        match decomposition_kind(query) {
            Some(DecompositionKind::MortalityAdjusted) => {
                decompose_mortality(&lowered, entities)
            },
            Some(DecompositionKind::Scenario) => decompose_scenario(&lowered, entities),
            Some(DecompositionKind::Aggregation) => decompose_aggregation(&lowered, entities),
            Some(DecompositionKind::Optimization) => decompose_optimization(&lowered, entities),
            None => vec![QueryStep {
                step_number: 1,
                description: "Fetch base performance".to_string(),
                step_type: StepType::BasePerformance,
                params: StepParams::BasePerformance {
                    breed: breed_of(entities),
                    sex: sex_of(entities),
                    age_days: age_of(entities),
                },
                dependencies: vec![],
            }],
        }
    }

    /// Decompose then execute.
    pub async fn run(&self, query: &str, entities: &ExtractedEntities) -> OrchestrationResult {
        let steps = self.decompose(query, entities);
        self.execute(steps).await
    }

    /// Execute a step sequence, strictly serial in ascending step number.
    /// Independent branches are never parallelized.
    pub async fn execute(&self, mut steps: Vec<QueryStep>) -> OrchestrationResult {
        let start = Instant::now();

        if let Err(e) = validate_dag(&steps) {
            return OrchestrationResult {
                success: false,
                steps_executed: 0,
                results: Vec::new(),
                final_result: None,
                execution_time_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            };
        }

        steps.sort_by_key(|s| s.step_number);

        let mut results: BTreeMap<u32, ExecutedStep> = BTreeMap::new();
        let mut errors: Vec<String> = Vec::new();

        for step in &steps {
            let missing_dep = step
                .dependencies
                .iter()
                .find(|dep| !results.contains_key(dep))
                .copied();
            if let Some(missing) = missing_dep {
                tracing::warn!(
                    "step {} skipped: dependency {} has no result",
                    step.step_number,
                    missing
                );
                errors.push(format!("step {} skipped: dependency {missing} unmet", step.step_number));
                continue;
            }

            match self.execute_step(step, &results).await {
                Ok(result) => {
                    results.insert(
                        step.step_number,
                        ExecutedStep {
                            step_number: step.step_number,
                            step_type: step.step_type,
                            result,
                        },
                    );
                },
                Err(e) => {
                    tracing::error!("step {} failed: {}", step.step_number, e);
                    errors.push(format!("step {}: {e}", step.step_number));
                },
            }
        }

        let final_result = results.values().next_back().map(|s| s.result.clone());

        OrchestrationResult {
            success: errors.is_empty(),
            steps_executed: results.len() as u32,
            results: results.into_values().collect(),
            final_result,
            execution_time_ms: start.elapsed().as_millis() as u64,
            error: if errors.is_empty() { None } else { Some(errors.join("; ")) },
        }
    }

    async fn execute_step(
        &self,
        step: &QueryStep,
        results: &BTreeMap<u32, ExecutedStep>,
    ) -> Result<StepResult, CoreError> {
        match &step.params {
            StepParams::BasePerformance { breed, sex, age_days } => {
                let base = self
                    .perf_store
                    .base_performance(breed, sex.as_str(), *age_days)
                    .await?;
                Ok(StepResult::Performance(base))
            },

            StepParams::FlockMortality { flock_size, mortality_pct } => {
                let base = dependency_performance(step, results)?;
                Ok(StepResult::FlockTotals(mortality_adjusted_totals(
                    base,
                    *flock_size,
                    *mortality_pct,
                )))
            },

            StepParams::Scenario(params) => {
                let totals = self.scenario_totals(params).await?;
                Ok(StepResult::FlockTotals(totals))
            },

            StepParams::ScenarioComparison => {
                let base = dependency_totals(step, results, 0)?;
                let modified = dependency_totals(step, results, 1)?;
                Ok(StepResult::Comparison(compare_scenarios(base, modified)))
            },

            StepParams::Metric { metric, scenario } => {
                let totals = self.scenario_totals(scenario).await?;
                Ok(StepResult::Metric(metric_from_totals(*metric, &totals)))
            },

            StepParams::Aggregate => {
                let metrics = step
                    .dependencies
                    .iter()
                    .filter_map(|dep| results.get(dep))
                    .filter_map(|executed| match &executed.result {
                        StepResult::Metric(value) => Some(value.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>();
                Ok(StepResult::Aggregate(AggregateSummary { metrics }))
            },

            StepParams::Optimization { breed, sex, objective, constraints } => {
                let outcome = self.optimize(breed, *sex, *objective, constraints).await?;
                Ok(StepResult::Optimization(outcome))
            },

            StepParams::Compromise { .. } => {
                let optimals: Vec<OptimizationOutcome> = step
                    .dependencies
                    .iter()
                    .filter_map(|dep| results.get(dep))
                    .filter_map(|executed| match &executed.result {
                        StepResult::Optimization(o) => Some(o.clone()),
                        _ => None,
                    })
                    .collect();
                Ok(StepResult::Compromise(find_compromise(optimals)?))
            },
        }
    }

    async fn scenario_totals(&self, params: &ScenarioParams) -> Result<FlockTotals, CoreError> {
        let base = self
            .perf_store
            .base_performance(&params.breed, params.sex.as_str(), params.age_days)
            .await?;
        Ok(mortality_adjusted_totals(base, params.flock_size, params.mortality_pct))
    }

    /// Scan ages in weekly increments and pick the best value for the
    /// objective among ages that satisfy the constraints.
    async fn optimize(
        &self,
        breed: &str,
        sex: Sex,
        objective: MetricKind,
        constraints: &OptimizationConstraints,
    ) -> Result<OptimizationOutcome, CoreError> {
        let min_age = constraints.min_age_days.unwrap_or(OPTIMIZATION_MIN_AGE);
        let max_age = constraints.max_age_days.unwrap_or(OPTIMIZATION_MAX_AGE);

        let mut best: Option<(u32, f64)> = None;

        for age in (min_age..=max_age).step_by(OPTIMIZATION_AGE_STEP) {
            let base = match self.perf_store.base_performance(breed, sex.as_str(), age).await {
                Ok(base) => base,
                Err(CoreError::PerfStoreEmpty) => continue,
                Err(e) => return Err(e),
            };

            if !satisfies_constraints(&base, age, constraints) {
                continue;
            }

            let value = match objective {
                MetricKind::Fcr => base.fcr,
                MetricKind::Weight => base.weight_g,
                MetricKind::FeedIntake => base.intake_g,
                _ => continue,
            };

            let better = match (&best, objective) {
                (None, _) => true,
                // FCR and feed are minimized, weight is maximized.
                (Some((_, current)), MetricKind::Fcr | MetricKind::FeedIntake) => {
                    value < *current
                },
                (Some((_, current)), _) => value > *current,
            };
            if better {
                best = Some((age, value));
            }
        }

        let (optimal_age_days, value_at_optimum) = best.ok_or(CoreError::PerfStoreEmpty)?;
        Ok(OptimizationOutcome { objective, optimal_age_days, value_at_optimum })
    }
}

// ============================================================================
// Decomposition
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecompositionKind {
    MortalityAdjusted,
    Scenario,
    Aggregation,
    Optimization,
}

fn decomposition_kind(query: &str) -> Option<DecompositionKind> {
    let lowered = crate::utils::strip_diacritics(&query.to_lowercase());

    // "N birds with X% mortality" needs the flock arithmetic; a bare
    // mention of mortality (a diagnosis question) does not.
    let mentions_mortality = lowered.contains("mortalite")
        || lowered.contains("mortality")
        || lowered.contains("mortalidad");
    let has_flock_figure = RE_PERCENT.is_match(&lowered)
        || RE_NUMBER
            .find_iter(&lowered)
            .filter_map(|m| m.as_str().replace([' ', ','], "").parse::<u32>().ok())
            .any(|n| n > 100);
    if mentions_mortality && has_flock_figure {
        return Some(DecompositionKind::MortalityAdjusted);
    }
    if lowered.contains("si je change") || lowered.contains("if i change") {
        return Some(DecompositionKind::Scenario);
    }
    if lowered.contains("total")
        && (lowered.contains('+') || lowered.contains(" et ") || lowered.contains(" and "))
    {
        return Some(DecompositionKind::Aggregation);
    }
    if (lowered.contains("optimis") || lowered.contains("optimiz"))
        && (lowered.contains("multi") || lowered.contains("plusieurs") || lowered.contains("several"))
    {
        return Some(DecompositionKind::Optimization);
    }
    None
}

fn decompose_mortality(lowered: &str, entities: &ExtractedEntities) -> Vec<QueryStep> {
    vec![
        QueryStep {
            step_number: 1,
            description: "Fetch per-bird base performance".to_string(),
            step_type: StepType::BasePerformance,
            params: StepParams::BasePerformance {
                breed: breed_of(entities),
                sex: sex_of(entities),
                age_days: age_of(entities),
            },
            dependencies: vec![],
        },
        QueryStep {
            step_number: 2,
            description: "Compute flock totals with mortality adjustment".to_string(),
            step_type: StepType::FlockCalculationWithMortality,
            params: StepParams::FlockMortality {
                flock_size: extract_flock_size(lowered, entities),
                mortality_pct: extract_mortality_pct(lowered, entities),
            },
            dependencies: vec![1],
        },
    ]
}

fn decompose_scenario(lowered: &str, entities: &ExtractedEntities) -> Vec<QueryStep> {
    let base = scenario_from_entities(entities);
    let modified = extract_scenario_modifications(lowered, &base);

    vec![
        QueryStep {
            step_number: 1,
            description: "Compute base scenario".to_string(),
            step_type: StepType::BaseScenario,
            params: StepParams::Scenario(base),
            dependencies: vec![],
        },
        QueryStep {
            step_number: 2,
            description: "Compute modified scenario".to_string(),
            step_type: StepType::ModifiedScenario,
            params: StepParams::Scenario(modified),
            dependencies: vec![],
        },
        QueryStep {
            step_number: 3,
            description: "Compare the two scenarios".to_string(),
            step_type: StepType::ScenarioComparison,
            params: StepParams::ScenarioComparison,
            dependencies: vec![1, 2],
        },
    ]
}

fn decompose_aggregation(lowered: &str, entities: &ExtractedEntities) -> Vec<QueryStep> {
    let metrics = extract_multiple_metrics(lowered);
    let scenario = scenario_from_entities(entities);

    let mut steps: Vec<QueryStep> = metrics
        .iter()
        .enumerate()
        .map(|(i, metric)| QueryStep {
            step_number: (i + 1) as u32,
            description: format!("Compute {}", metric.as_str()),
            step_type: StepType::MetricCalculation,
            params: StepParams::Metric { metric: *metric, scenario: scenario.clone() },
            dependencies: vec![],
        })
        .collect();

    steps.push(QueryStep {
        step_number: (metrics.len() + 1) as u32,
        description: "Aggregate all results".to_string(),
        step_type: StepType::AggregateResults,
        params: StepParams::Aggregate,
        dependencies: (1..=metrics.len() as u32).collect(),
    });

    steps
}

fn decompose_optimization(lowered: &str, entities: &ExtractedEntities) -> Vec<QueryStep> {
    let objectives = extract_objectives(lowered);
    let constraints = extract_constraints(lowered);
    let breed = breed_of(entities);
    let sex = sex_of(entities);

    let mut steps: Vec<QueryStep> = objectives
        .iter()
        .enumerate()
        .map(|(i, objective)| QueryStep {
            step_number: (i + 1) as u32,
            description: format!("Optimize for {}", objective.as_str()),
            step_type: StepType::SingleOptimization,
            params: StepParams::Optimization {
                breed: breed.clone(),
                sex,
                objective: *objective,
                constraints: constraints.clone(),
            },
            dependencies: vec![],
        })
        .collect();

    steps.push(QueryStep {
        step_number: (objectives.len() + 1) as u32,
        description: "Find the multi-objective compromise".to_string(),
        step_type: StepType::MultiObjectiveCompromise,
        params: StepParams::Compromise { objectives },
        dependencies: (1..=steps.len() as u32).collect(),
    });

    steps
}

// ============================================================================
// Step handlers (pure parts)
// ============================================================================

/// Flock totals after mortality adjustment. Feed consumption counts the
/// full initial flock: dead birds ate before dying.
pub fn mortality_adjusted_totals(
    base: BasePerformance,
    flock_size: u32,
    mortality_pct: f64,
) -> FlockTotals {
    let surviving_birds = (flock_size as f64 * (1.0 - mortality_pct / 100.0)) as u32;
    let dead_birds = flock_size - surviving_birds;

    FlockTotals {
        flock_size_initial: flock_size,
        surviving_birds,
        dead_birds,
        mortality_pct,
        total_live_weight_kg: base.weight_g * surviving_birds as f64 / 1000.0,
        total_feed_consumed_kg: base.intake_g * flock_size as f64 / 1000.0,
        avg_fcr: base.fcr,
    }
}

pub fn compare_scenarios(base: FlockTotals, modified: FlockTotals) -> ScenarioComparison {
    ScenarioComparison {
        weight_diff_kg: modified.total_live_weight_kg - base.total_live_weight_kg,
        feed_diff_kg: modified.total_feed_consumed_kg - base.total_feed_consumed_kg,
        base,
        modified,
    }
}

fn metric_from_totals(metric: MetricKind, totals: &FlockTotals) -> MetricValue {
    match metric {
        MetricKind::Weight => MetricValue {
            metric,
            value: totals.total_live_weight_kg,
            unit: "kg".to_string(),
        },
        MetricKind::FeedIntake => MetricValue {
            metric,
            value: totals.total_feed_consumed_kg,
            unit: "kg".to_string(),
        },
        MetricKind::Fcr => MetricValue { metric, value: totals.avg_fcr, unit: "ratio".to_string() },
        other => MetricValue { metric: other, value: 0.0, unit: other.unit().to_string() },
    }
}

/// Compromise between optimizations: the mean of the optimal ages.
pub fn find_compromise(
    optimals: Vec<OptimizationOutcome>,
) -> Result<CompromiseOutcome, CoreError> {
    if optimals.is_empty() {
        return Err(CoreError::UnknownStepType("compromise without optimizations".to_string()));
    }

    let mean_age =
        optimals.iter().map(|o| o.optimal_age_days).sum::<u32>() / optimals.len() as u32;

    Ok(CompromiseOutcome { compromise_age_days: mean_age, individual_optimals: optimals })
}

/// Every bound in [`OptimizationConstraints`] is checked here; daily gain
/// is averaged over the whole grow-out, live weight over age.
fn satisfies_constraints(
    base: &BasePerformance,
    age_days: u32,
    constraints: &OptimizationConstraints,
) -> bool {
    if let Some(min) = constraints.min_weight_g
        && base.weight_g < min
    {
        return false;
    }
    if let Some(max) = constraints.max_weight_g
        && base.weight_g > max
    {
        return false;
    }
    if let Some(max) = constraints.max_fcr
        && base.fcr > max
    {
        return false;
    }
    if let Some(min) = constraints.min_fcr
        && base.fcr < min
    {
        return false;
    }

    let daily_gain = base.weight_g / age_days.max(1) as f64;
    if let Some(min) = constraints.min_daily_gain_g
        && daily_gain < min
    {
        return false;
    }
    if let Some(max) = constraints.max_daily_gain_g
        && daily_gain > max
    {
        return false;
    }

    true
}

fn dependency_performance(
    step: &QueryStep,
    results: &BTreeMap<u32, ExecutedStep>,
) -> Result<BasePerformance, CoreError> {
    let dep = *step.dependencies.first().ok_or(CoreError::DependencyUnsatisfied {
        step: step.step_number,
        missing: 0,
    })?;
    match results.get(&dep).map(|e| &e.result) {
        Some(StepResult::Performance(base)) => Ok(*base),
        _ => Err(CoreError::DependencyUnsatisfied { step: step.step_number, missing: dep }),
    }
}

fn dependency_totals(
    step: &QueryStep,
    results: &BTreeMap<u32, ExecutedStep>,
    index: usize,
) -> Result<FlockTotals, CoreError> {
    let dep = *step.dependencies.get(index).ok_or(CoreError::DependencyUnsatisfied {
        step: step.step_number,
        missing: 0,
    })?;
    match results.get(&dep).map(|e| &e.result) {
        Some(StepResult::FlockTotals(totals)) => Ok(*totals),
        _ => Err(CoreError::DependencyUnsatisfied { step: step.step_number, missing: dep }),
    }
}

// ============================================================================
// Extraction helpers
// ============================================================================

fn breed_of(entities: &ExtractedEntities) -> String {
    entities.breed.as_ref().map(|b| b.value.clone()).unwrap_or_default()
}

fn sex_of(entities: &ExtractedEntities) -> Sex {
    entities.sex.as_ref().map(|s| s.value).unwrap_or(Sex::AsHatched)
}

fn age_of(entities: &ExtractedEntities) -> u32 {
    entities.age_days.as_ref().map(|a| a.value).unwrap_or(DEFAULT_AGE_DAYS)
}

fn scenario_from_entities(entities: &ExtractedEntities) -> ScenarioParams {
    ScenarioParams {
        breed: breed_of(entities),
        sex: sex_of(entities),
        age_days: age_of(entities),
        flock_size: entities
            .flock_size
            .as_ref()
            .map(|f| f.value)
            .unwrap_or(DEFAULT_FLOCK_SIZE),
        mortality_pct: entities.mortality_pct.as_ref().map(|m| m.value).unwrap_or(0.0),
        temperature_c: entities.temperature_c.as_ref().map(|t| t.value),
        density_per_m2: entities.density_per_m2.as_ref().map(|d| d.value),
        antibiotic_free: entities.antibiotic_free.as_ref().map(|a| a.value),
        feed_base: entities.feed_base.as_ref().map(|f| f.value),
    }
}

fn extract_flock_size(lowered: &str, entities: &ExtractedEntities) -> u32 {
    if let Some(size) = entities.flock_size.as_ref().map(|f| f.value) {
        return size;
    }

    RE_NUMBER
        .find_iter(lowered)
        .filter_map(|m| m.as_str().replace([' ', ','], "").parse::<u32>().ok())
        .find(|n| *n > 100)
        .unwrap_or(DEFAULT_FLOCK_SIZE)
}

fn extract_mortality_pct(lowered: &str, entities: &ExtractedEntities) -> f64 {
    if let Some(pct) = entities.mortality_pct.as_ref().map(|m| m.value) {
        return pct;
    }

    RE_PERCENT
        .captures(lowered)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse the requested modifications out of a "what if I change X"
/// question, starting from the base scenario.
pub fn extract_scenario_modifications(lowered: &str, base: &ScenarioParams) -> ScenarioParams {
    let mut modified = base.clone();

    if let Some(caps) = RE_BREED_CHANGE.captures(lowered) {
        modified.breed = caps[1].trim().replace(char::is_whitespace, "_");
    }

    if Regex::new(r"\b(?:males?|coqs?|roosters?)\b").expect("sex regex").is_match(lowered) {
        modified.sex = Sex::Male;
    } else if Regex::new(r"\b(?:femelles?|females?|poulettes?)\b")
        .expect("sex regex")
        .is_match(lowered)
    {
        modified.sex = Sex::Female;
    } else if Regex::new(r"\b(?:mixtes?|mixed)\b").expect("sex regex").is_match(lowered) {
        modified.sex = Sex::Mixed;
    }

    if let Some(caps) = RE_AGE_DAYS.captures(lowered)
        && let Ok(age) = caps[1].parse::<u32>()
    {
        modified.age_days = age;
    } else if let Some(caps) = RE_AGE_WEEKS.captures(lowered) {
        let weeks = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        if let Some(weeks) = weeks {
            modified.age_days = weeks * 7;
        }
    }

    if let Some(caps) = RE_TEMPERATURE.captures(lowered)
        && let Ok(temp) = caps[1].parse::<f64>()
    {
        modified.temperature_c = Some(temp);
    }

    if let Some(caps) = RE_DENSITY.captures(lowered)
        && let Ok(density) = caps[1].parse::<u32>()
    {
        modified.density_per_m2 = Some(density);
    }

    if lowered.contains("sans antibiotique") || lowered.contains("antibiotic free") {
        modified.antibiotic_free = Some(true);
    } else if lowered.contains("avec antibiotique") || lowered.contains("with antibiotic") {
        modified.antibiotic_free = Some(false);
    }

    if lowered.contains("mais") && lowered.contains("base") || lowered.contains("corn") {
        modified.feed_base = Some(FeedBase::Corn);
    } else if lowered.contains("ble") && lowered.contains("base") || lowered.contains("wheat") {
        modified.feed_base = Some(FeedBase::Wheat);
    }

    modified
}

fn extract_multiple_metrics(lowered: &str) -> Vec<MetricKind> {
    let mut metrics = Vec::new();
    if lowered.contains("poids") || lowered.contains("weight") {
        metrics.push(MetricKind::Weight);
    }
    if lowered.contains("aliment") || lowered.contains("feed") {
        metrics.push(MetricKind::FeedIntake);
    }
    if lowered.contains("fcr") || lowered.contains(" ic ") {
        metrics.push(MetricKind::Fcr);
    }
    if metrics.is_empty() {
        metrics.push(MetricKind::Weight);
    }
    metrics
}

fn extract_objectives(lowered: &str) -> Vec<MetricKind> {
    let mut objectives = Vec::new();
    if lowered.contains(" ic ") || lowered.contains("fcr") || lowered.contains("conversion") {
        objectives.push(MetricKind::Fcr);
    }
    if lowered.contains("poids") || lowered.contains("weight") {
        objectives.push(MetricKind::Weight);
    }
    if objectives.is_empty() {
        objectives.push(MetricKind::Fcr);
    }
    objectives
}

/// Parse min/max bounds from the question into optimization constraints.
pub fn extract_constraints(lowered: &str) -> OptimizationConstraints {
    let mut constraints = OptimizationConstraints::default();

    // The unit must close the phrase so "au moins 60 g/jour" stays a
    // daily-gain bound, not a weight bound.
    let weight_min = Regex::new(
        r"(?:poids\s+mini?(?:mum|mal)?|au moins)\s+(?:de\s+)?(\d+(?:\.\d+)?)\s*(kg|g)(?:[\s,.;)]|$)",
    )
    .expect("weight min regex");
    if let Some(caps) = weight_min.captures(lowered)
        && let Ok(mut value) = caps[1].parse::<f64>()
    {
        if &caps[2] == "kg" {
            value *= 1000.0;
        }
        constraints.min_weight_g = Some(value);
    }

    let weight_max = Regex::new(
        r"(?:poids\s+maxi?(?:mum|mal)?|maximum)\s+(?:de\s+)?(\d+(?:\.\d+)?)\s*(kg|g)(?:[\s,.;)]|$)",
    )
    .expect("weight max regex");
    if let Some(caps) = weight_max.captures(lowered)
        && let Ok(mut value) = caps[1].parse::<f64>()
    {
        if &caps[2] == "kg" {
            value *= 1000.0;
        }
        constraints.max_weight_g = Some(value);
    }

    let fcr_max = Regex::new(
        r"(?:ic|fcr)\s+(?:inferieur|inf|below|under|<|meilleur que)\s+(?:a\s+)?(\d(?:\.\d+)?)",
    )
    .expect("fcr max regex");
    if let Some(caps) = fcr_max.captures(lowered)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        constraints.max_fcr = Some(value);
    }

    let gain_min = Regex::new(
        r"(?:gain\s+(?:quotidien|journalier)|daily\s+gain)\s+(?:min(?:imum)?|of at least|at least)\s+(?:de\s+)?(\d+(?:\.\d+)?)",
    )
    .expect("gain min regex");
    if let Some(caps) = gain_min.captures(lowered)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        constraints.min_daily_gain_g = Some(value);
    }
    let gain_min_per_day = Regex::new(
        r"(?:au moins|at least)\s+(\d+(?:\.\d+)?)\s*g\s*/\s*(?:j(?:our)?|day)",
    )
    .expect("gain per day regex");
    if constraints.min_daily_gain_g.is_none()
        && let Some(caps) = gain_min_per_day.captures(lowered)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        constraints.min_daily_gain_g = Some(value);
    }

    let gain_max = Regex::new(
        r"(?:gain\s+(?:quotidien|journalier)|daily\s+gain)\s+(?:max(?:imum)?|below|under|inferieur)\s+(?:a\s+|de\s+)?(\d+(?:\.\d+)?)",
    )
    .expect("gain max regex");
    if let Some(caps) = gain_max.captures(lowered)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        constraints.max_daily_gain_g = Some(value);
    }

    let age_before = Regex::new(r"(?:avant|before|moins de)\s+(\d{1,3})\s*(?:jours?|days?)")
        .expect("age before regex");
    if let Some(caps) = age_before.captures(lowered)
        && let Ok(value) = caps[1].parse::<u32>()
    {
        constraints.max_age_days = Some(value);
    }

    let age_after = Regex::new(r"(?:apres|after)\s+(\d{1,3})\s*(?:jours?|days?)")
        .expect("age after regex");
    if let Some(caps) = age_after.captures(lowered)
        && let Ok(value) = caps[1].parse::<u32>()
    {
        constraints.min_age_days = Some(value);
    }

    let age_range = Regex::new(r"entre\s+(\d{1,3})\s+et\s+(\d{1,3})\s*(?:jours?|days?)")
        .expect("age range regex");
    if let Some(caps) = age_range.captures(lowered) {
        if let Ok(min) = caps[1].parse::<u32>() {
            constraints.min_age_days = Some(min);
        }
        if let Ok(max) = caps[2].parse::<u32>() {
            constraints.max_age_days = Some(max);
        }
    }

    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scored;

    fn entities_for_mortality() -> ExtractedEntities {
        ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            breed_type: Some(crate::models::BreedType::Specific),
            age_days: Some(Scored::new(42, 0.9)),
            flock_size: Some(Scored::new(10_000, 0.8)),
            mortality_pct: Some(Scored::new(5.0, 0.9)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mortality_query_decomposes_into_two_steps() {
        let query = "10000 Ross 308 à 42 jours avec 5% de mortalité, poids total et aliment total ?";
        let store = Arc::new(PerfStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/x").unwrap()));
        let orchestrator = MultiStepOrchestrator::new(store);

        let steps = orchestrator.decompose(query, &entities_for_mortality());
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_type, StepType::BasePerformance);
        assert_eq!(steps[1].step_type, StepType::FlockCalculationWithMortality);
        assert_eq!(steps[1].dependencies, vec![1]);
        assert!(validate_dag(&steps).is_ok());

        match &steps[1].params {
            StepParams::FlockMortality { flock_size, mortality_pct } => {
                assert_eq!(*flock_size, 10_000);
                assert_eq!(*mortality_pct, 5.0);
            },
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn mortality_totals_match_hand_computation() {
        let base = BasePerformance { weight_g: 2800.0, fcr: 1.65, intake_g: 4620.0 };
        let totals = mortality_adjusted_totals(base, 10_000, 5.0);

        assert_eq!(totals.surviving_birds, 9_500);
        assert_eq!(totals.dead_birds, 500);
        assert!((totals.total_live_weight_kg - 2800.0 * 9_500.0 / 1000.0).abs() < 1e-6);
        assert!((totals.total_feed_consumed_kg - 4620.0 * 10_000.0 / 1000.0).abs() < 1e-6);
        assert_eq!(totals.avg_fcr, 1.65);
    }

    #[test]
    fn zero_mortality_totals_are_exact() {
        let base = BasePerformance { weight_g: 2000.0, fcr: 1.6, intake_g: 3200.0 };
        let totals = mortality_adjusted_totals(base, 5_000, 0.0);

        assert_eq!(totals.surviving_birds, 5_000);
        assert_eq!(totals.dead_birds, 0);
        assert!((totals.total_live_weight_kg - 2000.0 * 5_000.0 / 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scenario_query_decomposes_into_three_steps() {
        let query = "si je change pour cobb 500, quel impact sur le poids ?";
        let store = Arc::new(PerfStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/x").unwrap()));
        let orchestrator = MultiStepOrchestrator::new(store);

        let steps = orchestrator.decompose(query, &entities_for_mortality());
        // "mortalité" is absent here, so the scenario pattern wins.
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].step_type, StepType::ScenarioComparison);
        assert_eq!(steps[2].dependencies, vec![1, 2]);
    }

    #[tokio::test]
    async fn aggregation_decomposition_has_terminal_step_depending_on_all() {
        let query = "poids total + aliment total pour 5000 poulets";
        let store = Arc::new(PerfStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/x").unwrap()));
        let orchestrator = MultiStepOrchestrator::new(store);

        let steps = orchestrator.decompose(query, &ExtractedEntities::default());
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].step_type, StepType::AggregateResults);
        assert_eq!(steps[2].dependencies, vec![1, 2]);
        assert!(validate_dag(&steps).is_ok());
    }

    #[test]
    fn scenario_modifications_parse_breed_sex_age() {
        let base = ScenarioParams {
            breed: "ross_308".to_string(),
            age_days: 42,
            flock_size: 1000,
            ..Default::default()
        };
        let modified = extract_scenario_modifications(
            "si je change pour cobb 500 avec des males a 35 jours",
            &base,
        );
        assert_eq!(modified.breed, "cobb_500");
        assert_eq!(modified.sex, Sex::Male);
        assert_eq!(modified.age_days, 35);
    }

    #[test]
    fn constraints_parse_weight_fcr_and_age_bounds() {
        let constraints = extract_constraints(
            "optimiser plusieurs objectifs: poids minimum de 2.2 kg, ic inferieur a 1.7, entre 28 et 49 jours",
        );
        assert_eq!(constraints.min_weight_g, Some(2200.0));
        assert_eq!(constraints.max_fcr, Some(1.7));
        assert_eq!(constraints.min_age_days, Some(28));
        assert_eq!(constraints.max_age_days, Some(49));
    }

    #[test]
    fn constraints_parse_daily_gain_bounds() {
        let fr = extract_constraints("gain quotidien minimum de 55");
        assert_eq!(fr.min_daily_gain_g, Some(55.0));

        let fr_per_day = extract_constraints("au moins 60 g/jour");
        assert_eq!(fr_per_day.min_daily_gain_g, Some(60.0));
        assert_eq!(fr_per_day.min_weight_g, None);

        let en = extract_constraints("daily gain below 70");
        assert_eq!(en.max_daily_gain_g, Some(70.0));
    }

    #[test]
    fn every_parsed_constraint_is_enforced() {
        // 2240 g at 35 days is 64 g/day average.
        let base = BasePerformance { weight_g: 2240.0, fcr: 1.62, intake_g: 3630.0 };

        let ok = OptimizationConstraints {
            min_weight_g: Some(2000.0),
            max_fcr: Some(1.7),
            min_daily_gain_g: Some(60.0),
            ..Default::default()
        };
        assert!(satisfies_constraints(&base, 35, &ok));

        let gain_too_low = OptimizationConstraints {
            min_daily_gain_g: Some(70.0),
            ..Default::default()
        };
        assert!(!satisfies_constraints(&base, 35, &gain_too_low));

        let gain_too_high = OptimizationConstraints {
            max_daily_gain_g: Some(50.0),
            ..Default::default()
        };
        assert!(!satisfies_constraints(&base, 35, &gain_too_high));

        let weight_short = OptimizationConstraints {
            min_weight_g: Some(2500.0),
            ..Default::default()
        };
        assert!(!satisfies_constraints(&base, 35, &weight_short));

        let fcr_over = OptimizationConstraints {
            max_fcr: Some(1.5),
            ..Default::default()
        };
        assert!(!satisfies_constraints(&base, 35, &fcr_over));
    }

    #[test]
    fn compromise_is_mean_of_optimal_ages() {
        let outcome = find_compromise(vec![
            OptimizationOutcome {
                objective: MetricKind::Fcr,
                optimal_age_days: 35,
                value_at_optimum: 1.55,
            },
            OptimizationOutcome {
                objective: MetricKind::Weight,
                optimal_age_days: 49,
                value_at_optimum: 3100.0,
            },
        ])
        .unwrap();
        assert_eq!(outcome.compromise_age_days, 42);
        assert_eq!(outcome.individual_optimals.len(), 2);
    }

    #[test]
    fn compromise_without_inputs_fails() {
        assert!(find_compromise(vec![]).is_err());
    }

    #[tokio::test]
    async fn invalid_dag_fails_before_execution() {
        let store = Arc::new(PerfStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/x").unwrap()));
        let orchestrator = MultiStepOrchestrator::new(store);

        let steps = vec![QueryStep {
            step_number: 1,
            description: String::new(),
            step_type: StepType::AggregateResults,
            params: StepParams::Aggregate,
            dependencies: vec![2],
        }];

        let result = orchestrator.execute(steps).await;
        assert!(!result.success);
        assert_eq!(result.steps_executed, 0);
    }

    #[tokio::test]
    async fn pure_steps_execute_without_backend() {
        let store = Arc::new(PerfStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/x").unwrap()));
        let orchestrator = MultiStepOrchestrator::new(store);

        // An aggregate over nothing is degenerate but touches no backend,
        // which pins the serial executor behavior.
        let steps = vec![QueryStep {
            step_number: 1,
            description: String::new(),
            step_type: StepType::AggregateResults,
            params: StepParams::Aggregate,
            dependencies: vec![],
        }];

        let result = orchestrator.execute(steps).await;
        assert!(result.success);
        assert_eq!(result.steps_executed, 1);
        assert!(matches!(result.final_result, Some(StepResult::Aggregate(_))));
    }
}
