//! Domain gate - rejects off-domain questions before any retrieval runs.
//!
//! A weighted keyword model over per-language whitelists and blacklists.
//! Normalization strips diacritics and punctuation; keywords longer than
//! four characters also match on their four-character root so inflected
//! forms ("mortalités", "vaccinations") still count.

use std::sync::Arc;

use crate::config::DomainGateConfig;
use crate::localization::{Language, MessageId, message, suggested_topics};
use crate::models::DomainRejection;
use crate::services::audit::AuditService;
use crate::utils::normalize_for_matching;

const POULTRY_TERMS_FR: &[&str] = &[
    "poulet", "poule", "volaille", "coq", "poussin", "oeuf", "aviculture", "aviaire", "poulailler",
    "voliere", "pondeuse", "chair", "dinde", "dindon", "canard", "ross", "cobb", "hubbard",
    "lohmann", "hyline", "isa", "souche", "lignee", "race", "croissance", "poids", "gain",
    "performance", "mortalite", "viabilite", "conversion", "indice", "aliment", "alimentation",
    "nutrition", "ration", "proteine", "energie", "lysine", "vitamine", "mineraux", "mais", "ble",
    "soja", "abreuvoir", "mangeoire", "starter", "grower", "finisher", "vaccin", "vaccination",
    "maladie", "pathologie", "symptome", "diagnostic", "traitement", "antibiotique", "coccidiose",
    "salmonelle", "gumboro", "newcastle", "bronchite", "marek", "biosecurite", "desinfection",
    "temperature", "ventilation", "humidite", "densite", "litiere", "eclairage", "photoperiode",
    "elevage", "eleveur", "troupeau", "bande", "batiment", "ferme", "agricole", "zootechnie",
    "sevrage", "reproduction", "couvoir", "incubation", "abattage",
];

const POULTRY_TERMS_EN: &[&str] = &[
    "chicken", "poultry", "broiler", "layer", "rooster", "hen", "chick", "egg", "aviculture",
    "avian", "flock", "coop", "turkey", "duck", "ross", "cobb", "hubbard", "lohmann", "hyline",
    "isa", "strain", "breed", "line", "growth", "weight", "gain", "performance", "mortality",
    "viability", "conversion", "feed", "feeding", "nutrition", "diet", "ration", "protein",
    "energy", "lysine", "vitamin", "mineral", "corn", "wheat", "soybean", "drinker", "feeder",
    "starter", "grower", "finisher", "vaccine", "vaccination", "disease", "pathology", "symptom",
    "diagnosis", "treatment", "antibiotic", "coccidiosis", "salmonella", "gumboro", "newcastle",
    "bronchitis", "marek", "biosecurity", "disinfection", "temperature", "ventilation", "humidity",
    "density", "litter", "lighting", "photoperiod", "farming", "farmer", "barn", "house",
    "livestock", "hatchery", "incubation", "slaughter", "fcr",
];

const POULTRY_TERMS_ES: &[&str] = &[
    "pollo", "gallina", "gallo", "pollito", "ave", "huevo", "avicultura", "aviar", "gallinero",
    "ponedora", "engorde", "pavo", "pato", "ross", "cobb", "hubbard", "lohmann", "hyline", "isa",
    "cepa", "raza", "linea", "crecimiento", "peso", "ganancia", "rendimiento", "mortalidad",
    "viabilidad", "conversion", "alimento", "alimentacion", "nutricion", "racion", "proteina",
    "energia", "lisina", "vitamina", "mineral", "maiz", "trigo", "soja", "bebedero", "comedero",
    "iniciador", "vacuna", "vacunacion", "enfermedad", "patologia", "sintoma", "diagnostico",
    "tratamiento", "antibiotico", "coccidiosis", "salmonela", "gumboro", "newcastle", "bronquitis",
    "marek", "bioseguridad", "desinfeccion", "temperatura", "ventilacion", "humedad", "densidad",
    "cama", "iluminacion", "fotoperiodo", "granja", "avicultor", "lote", "nave", "ganaderia",
    "incubadora", "sacrificio",
];

const OFF_DOMAIN_TERMS_FR: &[&str] = &[
    "finance", "banque", "bourse", "crypto", "bitcoin", "ethereum", "trading", "beaute",
    "maquillage", "cosmetique", "mode", "vetement", "cuisine", "recette", "restaurant",
    "gastronomie", "football", "tennis", "basketball", "athlete", "informatique", "ordinateur",
    "smartphone", "logiciel", "voyage", "tourisme", "vacances", "hotel", "politique", "election",
    "gouvernement", "president", "chirurgie", "automobile", "voiture", "moto", "immobilier",
    "appartement", "cinema", "film", "musique", "concert", "peinture", "litterature",
];

const OFF_DOMAIN_TERMS_EN: &[&str] = &[
    "finance", "bank", "banking", "stock", "crypto", "bitcoin", "ethereum", "trading", "beauty",
    "makeup", "cosmetic", "fashion", "clothing", "cooking", "recipe", "restaurant", "gastronomy",
    "football", "tennis", "basketball", "athlete", "computer", "smartphone", "software",
    "internet", "travel", "tourism", "vacation", "hotel", "politics", "election", "government",
    "president", "surgery", "automobile", "motorcycle", "realestate", "apartment", "cinema",
    "movie", "music", "concert", "painting", "literature",
];

const OFF_DOMAIN_TERMS_ES: &[&str] = &[
    "finanzas", "banco", "bolsa", "crypto", "bitcoin", "ethereum", "trading", "belleza",
    "maquillaje", "cosmetico", "moda", "ropa", "cocina", "receta", "restaurante", "gastronomia",
    "futbol", "tenis", "baloncesto", "atleta", "computadora", "telefono", "software", "viaje",
    "turismo", "vacaciones", "hotel", "politica", "eleccion", "gobierno", "presidente", "cirugia",
    "automovil", "moto", "inmobiliaria", "apartamento", "cine", "pelicula", "musica", "concierto",
    "pintura", "literatura",
];

/// Outcome of the gate: either accepted with a confidence, or a localized
/// rejection.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub accepted: bool,
    /// 0-100 scale.
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub rejected_keywords: Vec<String>,
    pub rejection: Option<DomainRejection>,
}

pub struct DomainGate {
    config: DomainGateConfig,
    audit: Option<Arc<AuditService>>,
}

impl DomainGate {
    pub fn new(config: DomainGateConfig, audit: Option<Arc<AuditService>>) -> Self {
        Self { config, audit }
    }

    fn keywords(lang: Language) -> (&'static [&'static str], &'static [&'static str]) {
        match lang {
            Language::Fr => (POULTRY_TERMS_FR, OFF_DOMAIN_TERMS_FR),
            Language::En => (POULTRY_TERMS_EN, OFF_DOMAIN_TERMS_EN),
            Language::Es => (POULTRY_TERMS_ES, OFF_DOMAIN_TERMS_ES),
        }
    }

    /// Evaluate a question and log any rejection with full context.
    pub async fn check(&self, question: &str, lang: Language) -> GateDecision {
        let decision = self.evaluate(question, lang);

        if let Some(rejection) = &decision.rejection {
            tracing::warn!(
                question = %question,
                language = %lang.as_str(),
                reason = %rejection.reason_code,
                confidence = decision.confidence,
                rejected_keywords = ?decision.rejected_keywords,
                "domain gate rejected question"
            );
            if let Some(audit) = &self.audit {
                audit
                    .record_gate_rejection(
                        question,
                        lang,
                        &rejection.reason_code,
                        decision.confidence,
                        &decision.rejected_keywords,
                    )
                    .await;
            }
        }

        decision
    }

    /// Pure decision function; see module docs for the scoring model.
    pub fn evaluate(&self, question: &str, lang: Language) -> GateDecision {
        if !self.config.enabled {
            return GateDecision {
                accepted: true,
                confidence: 100.0,
                matched_keywords: Vec::new(),
                rejected_keywords: Vec::new(),
                rejection: None,
            };
        }

        let normalized = normalize_for_matching(question);
        if normalized.is_empty() {
            return self.reject(question, lang, "too_general", 0.0, Vec::new());
        }

        let (agri_terms, off_terms) = Self::keywords(lang);
        let matched = find_keywords(&normalized, agri_terms);
        let rejected = find_keywords(&normalized, off_terms);

        let confidence =
            compute_confidence(normalized.split_whitespace().count(), matched.len(), rejected.len());

        if !rejected.is_empty() && matched.is_empty() {
            return self.reject(question, lang, "non_agricultural", 0.0, rejected);
        }

        if !matched.is_empty() {
            return GateDecision {
                accepted: true,
                confidence: confidence.max(50.0),
                matched_keywords: matched,
                rejected_keywords: rejected,
                rejection: None,
            };
        }

        if confidence < self.config.threshold {
            return self.reject(question, lang, "too_general", confidence, rejected);
        }

        GateDecision {
            accepted: true,
            confidence,
            matched_keywords: matched,
            rejected_keywords: rejected,
            rejection: None,
        }
    }

    fn reject(
        &self,
        _question: &str,
        lang: Language,
        reason_code: &str,
        confidence: f64,
        rejected_keywords: Vec<String>,
    ) -> GateDecision {
        let reason_id = if reason_code == "non_agricultural" {
            MessageId::RejectionNonAgricultural
        } else {
            MessageId::RejectionTooGeneral
        };

        GateDecision {
            accepted: false,
            confidence,
            matched_keywords: Vec::new(),
            rejected_keywords: rejected_keywords.clone(),
            rejection: Some(DomainRejection {
                reason: message(lang, reason_id).to_string(),
                reason_code: reason_code.to_string(),
                confidence,
                suggested_topics: suggested_topics(lang).iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

/// Keywords present in the normalized text, by containment or by shared
/// four-character root for words longer than four characters.
fn find_keywords(normalized: &str, keywords: &[&str]) -> Vec<String> {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut found = Vec::new();

    for keyword in keywords {
        if normalized.contains(keyword) {
            found.push(keyword.to_string());
            continue;
        }
        if keyword.len() > 4 {
            let root = &keyword[..4];
            if words.iter().any(|w| w.len() > 4 && w.starts_with(root)) {
                found.push(keyword.to_string());
            }
        }
    }

    found.sort();
    found.dedup();
    found
}

/// `min(100, agri_ratio*100 + agri_hits*15) − min(75, non_agri_hits*25)`,
/// clamped to [0, 100].
fn compute_confidence(word_count: usize, agri_hits: usize, non_agri_hits: usize) -> f64 {
    if word_count == 0 {
        return 0.0;
    }

    let agri_ratio = agri_hits as f64 / word_count as f64;
    let positive = (agri_ratio * 100.0 + agri_hits as f64 * 15.0).min(100.0);
    let penalty = (non_agri_hits as f64 * 25.0).min(75.0);

    (positive - penalty).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DomainGate {
        DomainGate::new(DomainGateConfig::default(), None)
    }

    #[test]
    fn empty_question_is_rejected_with_zero_confidence() {
        let decision = gate().evaluate("   ", Language::Fr);
        assert!(!decision.accepted);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn bitcoin_question_is_rejected_as_non_agricultural() {
        let decision = gate().evaluate("Quel est le prix du bitcoin aujourd'hui ?", Language::Fr);
        assert!(!decision.accepted);
        let rejection = decision.rejection.expect("should carry a rejection");
        assert_eq!(rejection.reason_code, "non_agricultural");
        assert!(!rejection.suggested_topics.is_empty());
        assert!(decision.rejected_keywords.contains(&"bitcoin".to_string()));
    }

    #[test]
    fn poultry_question_is_accepted_with_floor_confidence() {
        let decision =
            gate().evaluate("What is the target weight for Ross 308 broilers?", Language::En);
        assert!(decision.accepted);
        assert!(decision.confidence >= 50.0);
        assert!(decision.matched_keywords.iter().any(|k| k == "broiler"));
    }

    #[test]
    fn inflected_forms_match_by_root() {
        let decision = gate().evaluate("forte mortalites dans mon batiment", Language::Fr);
        assert!(decision.accepted);
        assert!(decision.matched_keywords.contains(&"mortalite".to_string()));
    }

    #[test]
    fn mixed_signals_with_agri_terms_accept() {
        // "feed" and "stock" both appear; any agri hit wins over the penalty.
        let decision = gate().evaluate("stock levels of broiler feed", Language::En);
        assert!(decision.accepted);
    }

    #[test]
    fn disabled_gate_accepts_everything() {
        let gate = DomainGate::new(DomainGateConfig { enabled: false, threshold: 15.0 }, None);
        assert!(gate.evaluate("bitcoin", Language::En).accepted);
    }
}
