//! Response enhancer.
//!
//! Post-hoc pass over a synthesized answer: checks coherence against the
//! enriched question, adapts the text to the user's context, and attaches
//! warnings plus optional clarifications. Provider-backed when available,
//! with a deterministic rule-based fallback.

use std::sync::Arc;

use serde::Deserialize;

use crate::localization::{Language, MessageId, message};
use crate::models::{Coherence, ConfidenceImpact, ExtractedEntities, MissingField};
use crate::services::completion::CompletionClient;
use crate::utils::content_words;

const MAX_CLARIFICATIONS: usize = 3;
const MAX_WARNINGS: usize = 2;

/// Output of the enhancement pass.
#[derive(Debug, Clone)]
pub struct Enhancement {
    pub enhanced_answer: String,
    pub optional_clarifications: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence_impact: ConfidenceImpact,
    pub coherence: Coherence,
    pub coherence_notes: String,
}

pub struct ResponseEnhancer {
    completion: Arc<CompletionClient>,
}

impl ResponseEnhancer {
    pub fn new(completion: Arc<CompletionClient>) -> Self {
        Self { completion }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn enhance(
        &self,
        raw_answer: &str,
        entities: &ExtractedEntities,
        missing: &[MissingField],
        conversation_context: &str,
        original_question: &str,
        enriched_question: &str,
        language: Language,
    ) -> Enhancement {
        let mut enhancement = if self.completion.is_available() {
            match self
                .enhance_with_provider(
                    raw_answer,
                    entities,
                    missing,
                    conversation_context,
                    original_question,
                    enriched_question,
                    language,
                )
                .await
            {
                Ok(enhancement) => enhancement,
                Err(e) => {
                    tracing::warn!("provider enhancement failed, using rule-based path: {}", e);
                    enhance_fallback(raw_answer, entities, missing, enriched_question, language)
                },
            }
        } else {
            enhance_fallback(raw_answer, entities, missing, enriched_question, language)
        };

        // A degraded coherence verdict must always come with something
        // actionable attached.
        if enhancement.coherence != Coherence::Good
            && enhancement.warnings.is_empty()
            && enhancement.optional_clarifications.is_empty()
        {
            enhancement
                .warnings
                .push(message(language, MessageId::WarningCoherenceMismatch).to_string());
        }

        enhancement.optional_clarifications.truncate(MAX_CLARIFICATIONS);
        enhancement.warnings.truncate(MAX_WARNINGS);
        enhancement
    }

    #[allow(clippy::too_many_arguments)]
    async fn enhance_with_provider(
        &self,
        raw_answer: &str,
        entities: &ExtractedEntities,
        missing: &[MissingField],
        conversation_context: &str,
        original_question: &str,
        enriched_question: &str,
        language: Language,
    ) -> Result<Enhancement, crate::services::completion::ProviderError> {
        let system = "You are a poultry veterinary expert adapting technical answers. \
            Compare the enriched question with the answer, adapt the answer to the user's \
            context, add warnings when missing data affects accuracy, and propose 1-3 useful \
            clarification questions. Coherence is 'good' when the answer fully addresses the \
            enriched question, 'partial' when relevant but incomplete or tangential, 'poor' \
            when it misses the topic. Respond ONLY with a JSON object: \
            {\"enhanced_answer\": string, \"optional_clarifications\": [string], \
            \"warnings\": [string], \"confidence_impact\": \"low\"|\"medium\"|\"high\", \
            \"coherence_check\": \"good\"|\"partial\"|\"poor\", \"coherence_notes\": string}. \
            All user-facing text in the requested language.";

        let missing_summary = if missing.is_empty() {
            "none".to_string()
        } else {
            missing.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
        };

        let user = format!(
            "LANGUAGE: {}\nORIGINAL QUESTION: \"{}\"\nENRICHED QUESTION: \"{}\"\n\
             RAW ANSWER:\n\"{}\"\n\nKNOWN ENTITY FIELDS: {}\nMISSING CRITICAL FIELDS: {}\n\
             CONVERSATION CONTEXT:\n{}",
            language.as_str(),
            original_question,
            enriched_question,
            raw_answer,
            entities.known_field_count(),
            missing_summary,
            conversation_context
        );

        let raw = self.completion.chat_json(system, &user).await?;
        let parsed: ProviderEnhancement = serde_json::from_str(&raw).map_err(|e| {
            crate::services::completion::ProviderError::ParseError(format!(
                "enhancer JSON: {e}"
            ))
        })?;

        let enhanced_answer = if parsed.enhanced_answer.trim().is_empty() {
            raw_answer.to_string()
        } else {
            parsed.enhanced_answer
        };

        Ok(Enhancement {
            enhanced_answer,
            optional_clarifications: parsed.optional_clarifications,
            warnings: parsed.warnings,
            confidence_impact: parse_impact(&parsed.confidence_impact),
            coherence: parse_coherence(&parsed.coherence_check),
            coherence_notes: parsed.coherence_notes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProviderEnhancement {
    #[serde(default)]
    enhanced_answer: String,
    #[serde(default)]
    optional_clarifications: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    confidence_impact: String,
    #[serde(default)]
    coherence_check: String,
    #[serde(default)]
    coherence_notes: String,
}

fn parse_impact(raw: &str) -> ConfidenceImpact {
    match raw {
        "medium" => ConfidenceImpact::Medium,
        "high" => ConfidenceImpact::High,
        _ => ConfidenceImpact::Low,
    }
}

fn parse_coherence(raw: &str) -> Coherence {
    match raw {
        "good" => Coherence::Good,
        "partial" => Coherence::Partial,
        "poor" => Coherence::Poor,
        _ => Coherence::Unknown,
    }
}

/// Rule-based enhancement used when the provider is unavailable or fails.
///
/// Coherence is approximated by shared non-trivial words between the
/// enriched question and the answer: three or more is good, one is
/// partial, none is poor.
pub fn enhance_fallback(
    raw_answer: &str,
    entities: &ExtractedEntities,
    missing: &[MissingField],
    enriched_question: &str,
    language: Language,
) -> Enhancement {
    let mut enhanced_answer = raw_answer.to_string();
    let mut warnings = Vec::new();
    let mut clarifications = Vec::new();

    let (coherence, coherence_notes) = if enriched_question.is_empty() {
        (Coherence::Unknown, "no enriched question to compare against".to_string())
    } else {
        let question_words = content_words(enriched_question);
        let answer_words = content_words(raw_answer);
        let shared: Vec<&String> = question_words.intersection(&answer_words).collect();

        match shared.len() {
            n if n >= 3 => (Coherence::Good, format!("{n} shared key terms")),
            n if n >= 1 => (Coherence::Partial, format!("only {n} shared key terms")),
            _ => (Coherence::Poor, "no shared key terms".to_string()),
        }
    };

    if missing.contains(&MissingField::Breed) {
        warnings.push(message(language, MessageId::WarningBreedMissing).to_string());
        clarifications.push(message(language, MessageId::ClarifyBreed).to_string());
    }
    if missing.contains(&MissingField::Age) {
        warnings.push(message(language, MessageId::WarningAgeMissing).to_string());
        clarifications.push(message(language, MessageId::ClarifyAge).to_string());
    }
    if missing.contains(&MissingField::Sex) && mentions_growth(raw_answer) {
        clarifications.push(message(language, MessageId::ClarifySex).to_string());
    }

    let confidence_impact = match missing.len() {
        0 => ConfidenceImpact::Low,
        1 => ConfidenceImpact::Medium,
        _ => ConfidenceImpact::High,
    };

    // Restate the known context so the user can spot a mismatch.
    let mut context_parts = Vec::new();
    if let Some(breed) = entities.breed.as_ref().filter(|b| b.confidence > 0.6) {
        context_parts.push(breed.value.clone());
    }
    if let Some(age) = entities.age_days.as_ref().filter(|a| a.confidence > 0.6) {
        context_parts.push(format!("{} days", age.value));
    }
    if !context_parts.is_empty() {
        enhanced_answer.push_str(&format!("\n\n[context: {}]", context_parts.join(", ")));
    }

    if !warnings.is_empty() && confidence_impact != ConfidenceImpact::Low {
        enhanced_answer.push_str("\n\n");
        enhanced_answer.push_str(&warnings.join(" "));
    }

    Enhancement {
        enhanced_answer,
        optional_clarifications: clarifications,
        warnings,
        confidence_impact,
        coherence,
        coherence_notes,
    }
}

fn mentions_growth(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    ["poids", "weight", "peso", "croissance", "growth", "crecimiento"]
        .iter()
        .any(|w| lowered.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scored;

    #[test]
    fn overlapping_answer_is_good() {
        let enhancement = enhance_fallback(
            "Ross 308 males reach 2235 grams at 35 days under standard density.",
            &ExtractedEntities::default(),
            &[],
            "target weight Ross 308 males 35 days normal growth",
            Language::En,
        );
        assert_eq!(enhancement.coherence, Coherence::Good);
        assert_eq!(enhancement.confidence_impact, ConfidenceImpact::Low);
    }

    #[test]
    fn off_topic_answer_degrades_coherence() {
        let enhancement = enhance_fallback(
            "Laying hens require sixteen hours of light per cycle.",
            &ExtractedEntities::default(),
            &[MissingField::Breed],
            "broiler target weight evaluation thirty five days",
            Language::En,
        );
        assert!(matches!(enhancement.coherence, Coherence::Partial | Coherence::Poor));
        assert!(!enhancement.warnings.is_empty());
    }

    #[test]
    fn missing_breed_and_age_is_high_impact_with_warnings() {
        let enhancement = enhance_fallback(
            "General advice about growth.",
            &ExtractedEntities::default(),
            &[MissingField::Breed, MissingField::Age],
            "",
            Language::Fr,
        );
        assert_eq!(enhancement.confidence_impact, ConfidenceImpact::High);
        assert_eq!(enhancement.warnings.len(), 2);
        assert_eq!(enhancement.optional_clarifications.len(), 2);
        // Warnings with high impact are appended to the answer text.
        assert!(enhancement.enhanced_answer.len() > "General advice about growth.".len());
    }

    #[test]
    fn known_context_is_restated() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            age_days: Some(Scored::new(21, 0.9)),
            ..Default::default()
        };
        let enhancement =
            enhance_fallback("Some answer.", &entities, &[], "question words", Language::En);
        assert!(enhancement.enhanced_answer.contains("ross_308"));
        assert!(enhancement.enhanced_answer.contains("21 days"));
    }

    #[tokio::test]
    async fn degraded_coherence_always_carries_something_actionable() {
        use crate::config::ProviderConfig;
        let enhancer =
            ResponseEnhancer::new(Arc::new(CompletionClient::new(ProviderConfig::default())));

        let enhancement = enhancer
            .enhance(
                "Totally unrelated text.",
                &ExtractedEntities::default(),
                &[],
                "",
                "original",
                "different enriched question entirely",
                Language::En,
            )
            .await;

        assert_ne!(enhancement.coherence, Coherence::Good);
        assert!(
            !enhancement.warnings.is_empty() || !enhancement.optional_clarifications.is_empty()
        );
    }
}
