//! Intent and entity extraction.
//!
//! Two tiers: deterministic dictionaries and regex patterns first, then an
//! optional strict-JSON completion call when a critical field stayed below
//! the confidence floor. Fields named in the current question always
//! override anything inherited from conversation history.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::localization::Language;
use crate::models::{
    BreedType, ConversationTurn, ExtractedEntities, FeedBase, Intent, Scored, Sex,
};
use crate::services::completion::CompletionClient;
use crate::utils::normalize_for_matching;

/// Confidence assigned to deterministic dictionary/regex matches.
const TIER1_CONFIDENCE: f64 = 0.9;
/// Confidence assigned to provider-extracted fields.
const TIER2_CONFIDENCE: f64 = 0.7;
/// Below this, a critical field triggers the tier-2 pass.
const CRITICAL_CONFIDENCE_FLOOR: f64 = 0.6;

static RE_STRAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(ross|cobb)\s*-?\s*(\d{3})\b").expect("strain regex")
});
static RE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3})\s*(days?|d\b|jours?|j\b|dias?|weeks?|wks?|semaines?|sem\b)")
        .expect("age regex")
});
static RE_WEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d+(?:[.,]\d+)?)\s*(kg|g)\b").expect("weight regex")
});
static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}(?:\.\d+)?)\s*%").expect("percent regex"));
static RE_TEMPERATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}(?:\.\d+)?)\s*(?:°\s*c|degres|degrees)\b").expect("temperature regex")
});
static RE_DENSITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:oiseaux|poulets|birds|aves)?\s*(?:par|per|/)\s*m\s*[²2]?")
        .expect("density regex")
});
static RE_FCR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:fcr|ic)\s*(?:de|of|:)?\s*(\d[.,]\d{1,2})\b").expect("fcr regex")
});
static RE_FLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}(?:[ ,]\d{3})+|\d{3,7})\b").expect("flock regex")
});

const GENERIC_BREED_TERMS: &[&str] = &[
    "poulet", "poulets", "poule", "poules", "volaille", "volailles", "chicken", "chickens",
    "bird", "birds", "hen", "hens", "broiler", "broilers", "pollo", "pollos", "ave", "aves",
];

const MALE_TERMS: &[&str] = &["male", "males", "coq", "coqs", "rooster", "roosters", "macho", "machos"];
const FEMALE_TERMS: &[&str] =
    &["female", "females", "femelle", "femelles", "poulette", "poulettes", "hembra", "hembras"];
const MIXED_TERMS: &[&str] = &["mixed", "mixte", "mixtes", "mixto", "mixtos"];
const AS_HATCHED_TERMS: &[&str] = &["as hatched", "as-hatched", "non sexe", "straight run"];

const SYMPTOM_TERMS: &[&str] = &[
    "boiterie", "lameness", "diarrhee", "diarrhea", "diarrea", "toux", "cough", "tos",
    "eternuement", "sneezing", "lethargie", "lethargy", "letargo", "plumage", "feather loss",
    "ne grossissent pas", "not growing", "poor growth", "perte d appetit", "loss of appetite",
    "prostration", "paralysie", "paralysis", "tremblement", "tremor",
];

struct IntentKeywords {
    intent: Intent,
    terms: &'static [&'static str],
}

const INTENT_KEYWORDS: &[IntentKeywords] = &[
    IntentKeywords {
        intent: Intent::DiagnosisTriage,
        terms: &[
            "pourquoi", "why", "por que", "cause", "maladie", "disease", "sick", "malade",
            "symptome", "symptom", "meurent", "dying", "diagnostic", "diagnosis",
        ],
    },
    IntentKeywords {
        intent: Intent::MetricQuery,
        terms: &[
            "poids", "weight", "peso", "gain", "fcr", "conversion", "target", "objectif",
            "standard", "norme", "combien", "how much", "how many", "cuanto", "performance",
            "mortalite", "mortality", "consommation", "intake", "eau", "water",
        ],
    },
    IntentKeywords {
        intent: Intent::EnvironmentSetting,
        terms: &[
            "temperature", "ventilation", "humidite", "humidity", "humedad", "eclairage",
            "lighting", "lumiere", "densite", "density", "densidad", "litiere", "litter",
            "ambiance", "chauffage", "heating",
        ],
    },
    IntentKeywords {
        intent: Intent::ProtocolQuery,
        terms: &[
            "vaccin", "vaccine", "vacuna", "vaccination", "protocole", "protocol", "programme",
            "program", "plan", "traitement", "treatment", "tratamiento", "schedule", "calendrier",
        ],
    },
    IntentKeywords {
        intent: Intent::EconomicsCost,
        terms: &[
            "cout", "cost", "costo", "prix", "price", "precio", "marge", "margin", "rentabilite",
            "profitability", "budget", "euro", "dollar",
        ],
    },
];

/// Result of an extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub intent: Intent,
    pub entities: ExtractedEntities,
    /// Question restated with the known context, consumed by the enhancer.
    pub enriched_question: String,
}

pub struct IntentExtractor {
    completion: Arc<CompletionClient>,
}

impl IntentExtractor {
    pub fn new(completion: Arc<CompletionClient>) -> Self {
        Self { completion }
    }

    /// Full extraction: tier 1, history inheritance, optional tier 2.
    pub async fn extract(
        &self,
        question: &str,
        history: &[ConversationTurn],
        language: Language,
    ) -> ExtractionOutcome {
        let (intent, mut entities) = extract_tier1(question);

        // Inherit from the most recent turn only; current fields win.
        if let Some(last_turn) = history.last() {
            let (_, prior) = extract_tier1(&last_turn.question);
            entities.inherit_from(&prior);
        }

        if self.needs_tier2(&entities) && self.completion.is_available() {
            match self.extract_tier2(question, language).await {
                Ok(llm_entities) => merge_tier2(&mut entities, llm_entities),
                Err(e) => {
                    tracing::debug!("tier-2 extraction skipped: {}", e);
                },
            }
        }

        let enriched_question = enrich_question(question, &entities);

        ExtractionOutcome { intent, entities, enriched_question }
    }

    fn needs_tier2(&self, entities: &ExtractedEntities) -> bool {
        let breed_weak = entities
            .breed
            .as_ref()
            .map(|b| b.confidence < CRITICAL_CONFIDENCE_FLOOR)
            .unwrap_or(true);
        let age_weak = entities
            .age_days
            .as_ref()
            .map(|a| a.confidence < CRITICAL_CONFIDENCE_FLOOR)
            .unwrap_or(true);
        breed_weak || age_weak
    }

    async fn extract_tier2(
        &self,
        question: &str,
        language: Language,
    ) -> Result<Tier2Entities, crate::services::completion::ProviderError> {
        let system = "You extract poultry husbandry entities from user questions. \
            Respond ONLY with a JSON object using exactly these keys, null when unknown: \
            {\"breed\": string|null, \"sex\": \"male\"|\"female\"|\"mixed\"|\"as_hatched\"|null, \
            \"age_days\": number|null, \"flock_size\": number|null, \"mortality_pct\": number|null, \
            \"temperature_c\": number|null, \"symptoms\": [string]}";
        let user = format!("Language: {}\nQuestion: {}", language.as_str(), question);

        let raw = self.completion.chat_json(system, &user).await?;
        serde_json::from_str(&raw).map_err(|e| {
            crate::services::completion::ProviderError::ParseError(format!(
                "tier-2 extraction JSON: {e}"
            ))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct Tier2Entities {
    breed: Option<String>,
    sex: Option<Sex>,
    age_days: Option<u32>,
    flock_size: Option<u32>,
    mortality_pct: Option<f64>,
    temperature_c: Option<f64>,
    #[serde(default)]
    symptoms: Vec<String>,
}

/// Deterministic extraction pass over one question.
pub fn extract_tier1(question: &str) -> (Intent, ExtractedEntities) {
    // Dictionaries match against the fully normalized form; numeric regexes
    // need `%`, `°` and decimal separators preserved.
    let raw_lower = question.to_lowercase();
    let lowered = crate::utils::strip_diacritics(&raw_lower);
    let normalized = normalize_for_matching(question);
    let mut entities = ExtractedEntities::default();

    extract_breed(&normalized, &mut entities);
    extract_sex(&normalized, &mut entities);
    extract_numeric_fields(&lowered, &mut entities);
    extract_qualitative_fields(&normalized, &raw_lower, &mut entities);

    let intent = classify_intent(&normalized, &entities);

    (intent, entities)
}

fn extract_breed(normalized: &str, entities: &mut ExtractedEntities) {
    if let Some(caps) = RE_STRAIN.captures(normalized) {
        let name = &caps[1];
        let number = &caps[2];
        entities.breed = Some(Scored::new(format!("{name}_{number}"), TIER1_CONFIDENCE));
        entities.breed_type = Some(BreedType::Specific);
        return;
    }

    for (alias, id) in [
        ("hubbard", "hubbard"),
        ("lohmann brown", "lohmann_brown"),
        ("lohmann", "lohmann"),
        ("isa brown", "isa_brown"),
        ("hyline", "hyline"),
        ("hy line", "hyline"),
    ] {
        if normalized.contains(alias) {
            entities.breed = Some(Scored::new(id.to_string(), TIER1_CONFIDENCE));
            entities.breed_type = Some(BreedType::Specific);
            return;
        }
    }

    // A bare species word with no strain is the generic-breed case.
    for term in GENERIC_BREED_TERMS {
        if word_present(normalized, term) {
            entities.breed = Some(Scored::new(term.to_string(), 0.8));
            entities.breed_type = Some(BreedType::Generic);
            return;
        }
    }
}

fn extract_sex(normalized: &str, entities: &mut ExtractedEntities) {
    let sex = if AS_HATCHED_TERMS.iter().any(|t| normalized.contains(t)) {
        Some(Sex::AsHatched)
    } else if MIXED_TERMS.iter().any(|t| word_present(normalized, t)) {
        Some(Sex::Mixed)
    } else if MALE_TERMS.iter().any(|t| word_present(normalized, t)) {
        Some(Sex::Male)
    } else if FEMALE_TERMS.iter().any(|t| word_present(normalized, t)) {
        Some(Sex::Female)
    } else {
        None
    };

    if let Some(sex) = sex {
        entities.sex = Some(Scored::new(sex, TIER1_CONFIDENCE));
    }
}

fn extract_numeric_fields(lowered: &str, entities: &mut ExtractedEntities) {
    if let Some(caps) = RE_AGE.captures(lowered)
        && let Ok(value) = caps[1].parse::<u32>()
    {
        let unit = &caps[2];
        let days = if unit.starts_with("week") || unit.starts_with("sem") || unit.starts_with("wk")
        {
            value * 7
        } else {
            value
        };
        entities.age_days = Some(Scored::new(days, TIER1_CONFIDENCE));
    }

    if let Some(caps) = RE_WEIGHT.captures(lowered)
        && let Ok(value) = caps[1].replace(',', ".").parse::<f64>()
    {
        let grams = if &caps[2] == "kg" { value * 1000.0 } else { value };
        entities.target_weight_g = Some(Scored::new(grams, TIER1_CONFIDENCE));
    }

    if (lowered.contains("mortalit") || lowered.contains("mortality"))
        && let Some(caps) = RE_PERCENT.captures(lowered)
        && let Ok(pct) = caps[1].parse::<f64>()
    {
        entities.mortality_pct = Some(Scored::new(pct, TIER1_CONFIDENCE));
    }

    if let Some(caps) = RE_TEMPERATURE.captures(lowered)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        entities.temperature_c = Some(Scored::new(value, TIER1_CONFIDENCE));
    }

    if let Some(caps) = RE_DENSITY.captures(lowered)
        && let Ok(value) = caps[1].parse::<u32>()
    {
        entities.density_per_m2 = Some(Scored::new(value, TIER1_CONFIDENCE));
    }

    if let Some(caps) = RE_FCR.captures(lowered)
        && let Ok(value) = caps[1].replace(',', ".").parse::<f64>()
    {
        entities.fcr = Some(Scored::new(value, TIER1_CONFIDENCE));
    }

    // Flock size: the largest standalone number above 100 that was not
    // already claimed by another field or by a strain name.
    let mut claimed: Vec<u32> = [
        entities.age_days.as_ref().map(|a| a.value),
        entities.target_weight_g.as_ref().map(|w| w.value as u32),
    ]
    .into_iter()
    .flatten()
    .collect();
    if let Some(caps) = RE_STRAIN.captures(lowered)
        && let Ok(strain_number) = caps[2].parse::<u32>()
    {
        claimed.push(strain_number);
    }

    let flock = RE_FLOCK
        .find_iter(lowered)
        .filter_map(|m| m.as_str().replace([' ', ','], "").parse::<u32>().ok())
        .filter(|n| *n > 100 && !claimed.contains(n))
        .max();
    if let Some(size) = flock {
        entities.flock_size = Some(Scored::new(size, 0.8));
    }
}

fn extract_qualitative_fields(normalized: &str, raw_lower: &str, entities: &mut ExtractedEntities) {
    for term in SYMPTOM_TERMS {
        if normalized.contains(term) {
            entities.symptoms.push(term.to_string());
        }
    }

    // "maïs" keeps its diacritic on purpose: the bare form collides with the
    // French conjunction "mais".
    if raw_lower.contains("maïs") || word_present(normalized, "corn") {
        entities.feed_base = Some(Scored::new(FeedBase::Corn, 0.8));
    } else if word_present(normalized, "ble") || word_present(normalized, "wheat") {
        entities.feed_base = Some(Scored::new(FeedBase::Wheat, 0.8));
    }

    if normalized.contains("sans antibiotique")
        || normalized.contains("antibiotic free")
        || normalized.contains("without antibiotic")
    {
        entities.antibiotic_free = Some(Scored::new(true, TIER1_CONFIDENCE));
    } else if normalized.contains("avec antibiotique") || normalized.contains("with antibiotic") {
        entities.antibiotic_free = Some(Scored::new(false, TIER1_CONFIDENCE));
    }

    for (term, housing) in [
        ("plein air", "free_range"),
        ("free range", "free_range"),
        ("batiment ferme", "closed_barn"),
        ("closed barn", "closed_barn"),
        ("voliere", "aviary"),
        ("aviary", "aviary"),
        ("cage", "cage"),
    ] {
        if normalized.contains(term) {
            entities.housing = Some(Scored::new(housing.to_string(), 0.8));
            break;
        }
    }
}

fn classify_intent(normalized: &str, entities: &ExtractedEntities) -> Intent {
    if !entities.symptoms.is_empty() {
        return Intent::DiagnosisTriage;
    }

    let mut best = Intent::GeneralPoultry;
    let mut best_hits = 0usize;

    for group in INTENT_KEYWORDS {
        let hits = group.terms.iter().filter(|t| normalized.contains(*t)).count();
        if hits > best_hits {
            best_hits = hits;
            best = group.intent;
        }
    }

    best
}

fn merge_tier2(entities: &mut ExtractedEntities, llm: Tier2Entities) {
    if entities.breed.as_ref().map(|b| b.confidence < CRITICAL_CONFIDENCE_FLOOR).unwrap_or(true)
        && let Some(breed) = llm.breed.filter(|b| !b.is_empty())
    {
        let normalized = breed.to_lowercase().replace([' ', '-'], "_");
        entities.breed = Some(Scored::new(normalized, TIER2_CONFIDENCE));
        if entities.breed_type.is_none() {
            entities.breed_type = Some(BreedType::Specific);
        }
    }
    if entities.sex.is_none()
        && let Some(sex) = llm.sex
    {
        entities.sex = Some(Scored::new(sex, TIER2_CONFIDENCE));
    }
    if entities.age_days.is_none()
        && let Some(age) = llm.age_days
    {
        entities.age_days = Some(Scored::new(age, TIER2_CONFIDENCE));
    }
    if entities.flock_size.is_none()
        && let Some(size) = llm.flock_size
    {
        entities.flock_size = Some(Scored::new(size, TIER2_CONFIDENCE));
    }
    if entities.mortality_pct.is_none()
        && let Some(pct) = llm.mortality_pct
    {
        entities.mortality_pct = Some(Scored::new(pct, TIER2_CONFIDENCE));
    }
    if entities.temperature_c.is_none()
        && let Some(temp) = llm.temperature_c
    {
        entities.temperature_c = Some(Scored::new(temp, TIER2_CONFIDENCE));
    }
    if entities.symptoms.is_empty() {
        entities.symptoms = llm.symptoms;
    }
}

fn enrich_question(question: &str, entities: &ExtractedEntities) -> String {
    let mut context = Vec::new();
    if let Some(breed) = &entities.breed {
        context.push(format!("breed: {}", breed.value));
    }
    if let Some(sex) = &entities.sex {
        context.push(format!("sex: {}", sex.value.as_str()));
    }
    if let Some(age) = &entities.age_days {
        context.push(format!("age: {} days", age.value));
    }
    if let Some(size) = &entities.flock_size {
        context.push(format!("flock: {} birds", size.value));
    }
    if let Some(pct) = &entities.mortality_pct {
        context.push(format!("mortality: {}%", pct.value));
    }

    if context.is_empty() {
        question.to_string()
    } else {
        format!("{} ({})", question, context.join(", "))
    }
}

fn word_present(normalized: &str, word: &str) -> bool {
    normalized.split_whitespace().any(|w| w == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_specific_strain_and_filters() {
        let (intent, entities) =
            extract_tier1("What is the target body weight for Ross 308 males at 35 days?");
        assert_eq!(intent, Intent::MetricQuery);
        assert_eq!(entities.breed.as_ref().map(|b| b.value.as_str()), Some("ross_308"));
        assert_eq!(entities.breed_type, Some(BreedType::Specific));
        assert_eq!(entities.sex.as_ref().map(|s| s.value), Some(Sex::Male));
        assert_eq!(entities.age_days.as_ref().map(|a| a.value), Some(35));
    }

    #[test]
    fn bare_species_term_is_generic() {
        let (_, entities) = extract_tier1("Mes poulets ne grossissent pas");
        assert_eq!(entities.breed_type, Some(BreedType::Generic));
        assert!(!entities.symptoms.is_empty());
    }

    #[test]
    fn weeks_convert_to_days() {
        let (_, entities) = extract_tier1("poids cible à 3 semaines");
        assert_eq!(entities.age_days.as_ref().map(|a| a.value), Some(21));
    }

    #[test]
    fn mortality_needs_the_keyword_next_to_the_percent() {
        let (_, with) = extract_tier1("5% de mortalité sur le lot");
        assert_eq!(with.mortality_pct.as_ref().map(|m| m.value), Some(5.0));

        let (_, without) = extract_tier1("5% de remise sur le lot");
        assert!(without.mortality_pct.is_none());
    }

    #[test]
    fn flock_size_prefers_large_numbers() {
        let (_, entities) = extract_tier1("10000 Ross 308 à 42 jours avec 5% de mortalité");
        assert_eq!(entities.flock_size.as_ref().map(|f| f.value), Some(10_000));
        assert_eq!(entities.age_days.as_ref().map(|a| a.value), Some(42));
        assert_eq!(entities.mortality_pct.as_ref().map(|m| m.value), Some(5.0));
    }

    #[test]
    fn symptoms_force_diagnosis_intent() {
        let (intent, _) = extract_tier1("forte diarrhée et léthargie chez mes poulets");
        assert_eq!(intent, Intent::DiagnosisTriage);
    }

    #[test]
    fn kg_weight_converts_to_grams() {
        let (_, entities) = extract_tier1("objectif 2.4 kg pour cobb 500");
        assert_eq!(entities.target_weight_g.as_ref().map(|w| w.value), Some(2400.0));
        assert_eq!(entities.breed.as_ref().map(|b| b.value.as_str()), Some("cobb_500"));
    }

    #[test]
    fn temperature_extraction() {
        let (_, entities) = extract_tier1("quelle température, 32°C est-ce correct ?");
        assert_eq!(entities.temperature_c.as_ref().map(|t| t.value), Some(32.0));
    }
}
