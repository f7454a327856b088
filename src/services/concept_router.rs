//! Concept router - picks the retrieval route for a question.
//!
//! Scores eight concept categories over the query, lifts scores that the
//! extracted entities already prove (a named strain is stronger evidence
//! than any keyword), then walks a fixed decision table. Identical inputs
//! always produce the identical decision.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    BreedType, ConceptScores, ExtractedEntities, Intent, MetricKind, QueryFilters, QueryRoute,
    RouteDecision,
};
use crate::utils::strip_diacritics;

const PERFORMANCE_CONCEPTS: &[(&str, &[&str])] = &[
    ("weight", &["weight", "poids", "bw", "body weight", "live weight", "masse", "peso"]),
    ("growth", &["growth", "gain", "croissance", "adg", "daily gain", "gain quotidien"]),
    ("fcr", &["fcr", "feed conversion", "conversion alimentaire", "indice consommation"]),
    ("mortality", &["mortality", "mortalite", "death", "viabilite", "viability"]),
    ("feed_intake", &["intake", "consommation", "consumption", "ingestion"]),
    ("targets", &["target", "objectif", "goal", "standard", "norme", "specification"]),
    ("performance", &["performance", "resultat", "result", "efficacite"]),
];

const NUTRITION_CONCEPTS: &[(&str, &[&str])] = &[
    ("protein", &["protein", "proteine", "crude protein"]),
    ("energy", &["energy", "energie", "metabolizable", "kcal"]),
    ("amino_acids", &["lysine", "methionine", "threonine", "tryptophan", "acides amines"]),
    ("minerals", &["calcium", "phosphorus", "sodium", "phosphore", "mineraux"]),
    ("vitamins", &["vitamin", "vitamine", "supplement"]),
    ("feed", &["feed", "aliment", "diet", "ration", "formulation"]),
];

const HEALTH_CONCEPTS: &[(&str, &[&str])] = &[
    ("disease", &["disease", "maladie", "pathology", "pathologie", "infection"]),
    ("vaccine", &["vaccine", "vaccin", "vaccination", "immunization"]),
    ("treatment", &["treatment", "traitement", "medication", "medicament", "antibiotic"]),
    ("biosecurity", &["biosecurity", "biosecurite", "hygiene", "disinfection"]),
    ("welfare", &["welfare", "bien etre", "stress", "comfort", "confort"]),
];

const MANAGEMENT_CONCEPTS: &[(&str, &[&str])] = &[
    ("housing", &["housing", "logement", "cage", "aviary", "voliere", "density", "densite"]),
    ("environment", &["temperature", "humidity", "humidite", "ventilation"]),
    ("lighting", &["light", "lumiere", "eclairage", "photoperiod", "photoperiode"]),
    ("water", &["water", "eau", "drinking", "abreuvement", "nipple"]),
];

const SPECIES_INDICATORS: &[(&str, &[&str])] = &[
    ("broiler", &["broiler", "poulet de chair", "chair", "meat", "viande"]),
    ("layer", &["layer", "pondeuse", "laying", "ponte", "egg", "oeuf"]),
    ("breeder", &["breeder", "reproducteur", "parent stock", "breeding"]),
    ("duck", &["duck", "canard", "waterfowl"]),
    ("turkey", &["turkey", "dinde", "dindon"]),
];

const LINE_INDICATORS: &[(&str, &[&str])] = &[
    ("ross", &["ross"]),
    ("cobb", &["cobb"]),
    ("hubbard", &["hubbard"]),
    ("lohmann", &["lohmann"]),
    ("hyline", &["hyline", "hy line"]),
    ("isabrown", &["isa brown", "warren"]),
];

static QUANTITATIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d+\s*(g|kg|lb|gram|kilo)",
        r"\d+\s*(day|days|week|weeks|jour|jours|semaine)",
        r"\d+\s*%",
        r"combien|how much|how many|quel.*poids|what.*weight|cuanto",
        r"target|objectif|standard|norme|specification",
        r"compare|comparer|versus|vs|difference|ecart",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("quantitative pattern"))
    .collect()
});

static COMPARISON_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"compare|comparer|comparison|comparaison",
        r"versus|vs\b|contre|against",
        r"difference|ecart|gap",
        r"meilleur|better|best|optimal",
        r"which|quel|lequel|quelle",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("comparison pattern"))
    .collect()
});

/// Strains that identify a broiler line; everything else named is a layer.
const BROILER_LINES: &[&str] = &["ross", "cobb", "hubbard"];

pub struct ConceptRouter;

impl ConceptRouter {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a question and decide where to search.
    pub fn analyze(
        &self,
        query: &str,
        _intent: Intent,
        entities: &ExtractedEntities,
    ) -> RouteDecision {
        let lowered = strip_diacritics(&query.to_lowercase());

        let mut concepts = ConceptScores {
            performance: score_category(&lowered, PERFORMANCE_CONCEPTS),
            nutrition: score_category(&lowered, NUTRITION_CONCEPTS),
            health: score_category(&lowered, HEALTH_CONCEPTS),
            management: score_category(&lowered, MANAGEMENT_CONCEPTS),
            species_specific: score_category(&lowered, SPECIES_INDICATORS),
            line_specific: score_category(&lowered, LINE_INDICATORS),
            quantitative: score_patterns(&lowered, &QUANTITATIVE_PATTERNS, 3),
            comparison: score_patterns(&lowered, &COMPARISON_PATTERNS, 2),
        };

        let filters = extract_filters(&lowered, entities);

        // Entities beat keyword fractions: a named strain proves both the
        // species and the line, and a named metric proves the topic.
        if entities.breed_type == Some(BreedType::Specific) {
            concepts.line_specific = concepts.line_specific.max(1.0);
            concepts.species_specific = concepts.species_specific.max(1.0);
        }
        // The metric boost stays off for comparison questions so they can
        // still reach the hybrid rule further down the table.
        if !filters.metrics.is_empty() && concepts.comparison <= 0.5 {
            concepts.performance = concepts.performance.max(0.5);
        }

        let (route, confidence, reasoning) = decide(&concepts);

        RouteDecision {
            route,
            confidence,
            concepts,
            filters,
            reasoning: reasoning.to_string(),
        }
    }
}

impl Default for ConceptRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn decide(concepts: &ConceptScores) -> (QueryRoute, f64, &'static str) {
    if concepts.quantitative > 0.6 && concepts.performance > 0.4 {
        return (
            QueryRoute::PerfStore,
            0.8,
            "quantitative performance question: direct store lookup",
        );
    }

    if concepts.species_specific > 0.5
        && concepts.line_specific > 0.3
        && concepts.performance > 0.3
    {
        return (
            QueryRoute::PerfStore,
            0.75,
            "species, line and metric all identified: store lookup",
        );
    }

    if concepts.comparison > 0.5 && concepts.quantitative > 0.4 {
        return (QueryRoute::Hybrid, 0.7, "quantitative comparison: store plus context");
    }

    if concepts.performance > 0.3 || concepts.nutrition > 0.3 || concepts.health > 0.3 {
        return (QueryRoute::Vector, 0.6, "contextual question: vector retrieval");
    }

    if concepts.max() < 0.3 {
        return (QueryRoute::Clarify, 0.8, "no concept scored: clarification needed");
    }

    (QueryRoute::Vector, 0.4, "default route: vector retrieval")
}

fn score_category(lowered: &str, concepts: &[(&str, &[&str])]) -> f64 {
    if concepts.is_empty() {
        return 0.0;
    }
    let matched = concepts
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .count();
    matched as f64 / concepts.len() as f64
}

fn score_patterns(lowered: &str, patterns: &[Regex], normalizer: usize) -> f64 {
    let matched = patterns.iter().filter(|p| p.is_match(lowered)).count();
    (matched as f64 / normalizer as f64).min(1.0)
}

fn extract_filters(lowered: &str, entities: &ExtractedEntities) -> QueryFilters {
    let mut filters = QueryFilters::default();

    // Line comes from the extractor when it saw a specific strain.
    if entities.breed_type == Some(BreedType::Specific) {
        filters.line = entities.breed.as_ref().map(|b| b.value.clone());
    }
    if filters.line.is_none() {
        for (line, keywords) in LINE_INDICATORS {
            if keywords.iter().any(|k| lowered.contains(k)) {
                filters.line = Some((*line).to_string());
                break;
            }
        }
    }

    for (species, keywords) in SPECIES_INDICATORS {
        if keywords.iter().any(|k| lowered.contains(k)) {
            filters.species = Some((*species).to_string());
            break;
        }
    }
    // A named line implies the species even when no species word appears.
    if filters.species.is_none()
        && let Some(line) = &filters.line
    {
        let species = if BROILER_LINES.iter().any(|b| line.starts_with(b)) {
            "broiler"
        } else {
            "layer"
        };
        filters.species = Some(species.to_string());
    }

    filters.sex = entities.sex.as_ref().map(|s| s.value);
    filters.age_days = entities.age_days.as_ref().map(|a| a.value);

    for (concept, keywords) in PERFORMANCE_CONCEPTS {
        if keywords.iter().any(|k| lowered.contains(k)) {
            let metric = match *concept {
                "weight" => Some(MetricKind::Weight),
                "growth" => Some(MetricKind::DailyGain),
                "fcr" => Some(MetricKind::Fcr),
                "mortality" => Some(MetricKind::Mortality),
                "feed_intake" => Some(MetricKind::FeedIntake),
                _ => None,
            };
            if let Some(metric) = metric
                && !filters.metrics.contains(&metric)
            {
                filters.metrics.push(metric);
            }
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Scored, Sex};
    use crate::services::intent::extract_tier1;

    fn analyze(query: &str) -> RouteDecision {
        let (intent, entities) = extract_tier1(query);
        ConceptRouter::new().analyze(query, intent, &entities)
    }

    #[test]
    fn ross_weight_question_routes_to_perf_store() {
        let decision = analyze("What is the target body weight for Ross 308 males at 35 days?");
        assert_eq!(decision.route, QueryRoute::PerfStore);
        assert_eq!(decision.filters.species.as_deref(), Some("broiler"));
        assert_eq!(decision.filters.line.as_deref(), Some("ross_308"));
        assert_eq!(decision.filters.sex, Some(Sex::Male));
        assert_eq!(decision.filters.age_days, Some(35));
        assert_eq!(decision.filters.metrics, vec![MetricKind::Weight]);
    }

    #[test]
    fn comparison_with_numbers_routes_hybrid() {
        let decision =
            analyze("Compare FCR of Ross 308 versus Cobb 500 at 42 days, which is better?");
        assert_eq!(decision.route, QueryRoute::Hybrid);
    }

    #[test]
    fn contextual_health_question_routes_vector() {
        let decision = analyze("How should I adjust the vaccination program against disease?");
        assert_eq!(decision.route, QueryRoute::Vector);
    }

    #[test]
    fn ambiguous_question_routes_clarify() {
        let decision = analyze("Que faire ?");
        assert_eq!(decision.route, QueryRoute::Clarify);
    }

    #[test]
    fn routing_is_deterministic() {
        let query = "Quel poids pour Ross 308 males a 35 jours ?";
        let (intent, entities) = extract_tier1(query);
        let router = ConceptRouter::new();
        let first = router.analyze(query, intent, &entities);
        let second = router.analyze(query, intent, &entities);
        assert_eq!(first.route, second.route);
        assert_eq!(first.filters, second.filters);
        assert_eq!(first.concepts, second.concepts);
    }

    #[test]
    fn layer_species_inferred_from_layer_line() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("lohmann_brown".to_string(), 0.9)),
            breed_type: Some(crate::models::BreedType::Specific),
            ..Default::default()
        };
        let decision = ConceptRouter::new().analyze(
            "poids optimal pour lohmann brown",
            crate::models::Intent::MetricQuery,
            &entities,
        );
        assert_eq!(decision.filters.species.as_deref(), Some("layer"));
    }
}
