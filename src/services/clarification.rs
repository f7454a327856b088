//! Clarification engine.
//!
//! Decides whether extraction produced enough to answer, or returns up to
//! three localized questions. The generic-breed rule is mandatory and never
//! consults the provider.

use std::sync::Arc;

use crate::config::ClarificationConfig;
use crate::localization::{Language, MessageId, message};
use crate::models::{BreedType, ClarificationRequest, ExtractedEntities, Intent, MissingField};
use crate::services::completion::CompletionClient;

const GROWTH_TERMS: &[&str] = &[
    "weight", "poids", "peso", "growth", "croissance", "crecimiento", "gain", "grossis",
];

/// Outcome of the assessment.
#[derive(Debug, Clone)]
pub enum ClarificationVerdict {
    Clear,
    Needed(ClarificationRequest),
}

impl ClarificationVerdict {
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear)
    }
}

pub struct ClarificationEngine {
    config: ClarificationConfig,
    completion: Arc<CompletionClient>,
}

impl ClarificationEngine {
    pub fn new(config: ClarificationConfig, completion: Arc<CompletionClient>) -> Self {
        Self { config, completion }
    }

    /// Rules (a)-(c) first; only rule (d) consults the provider.
    pub async fn assess(
        &self,
        question: &str,
        intent: Intent,
        entities: &ExtractedEntities,
        language: Language,
    ) -> ClarificationVerdict {
        if let Some(verdict) = self.assess_rules(question, intent, entities, language) {
            return verdict;
        }

        if !self.completion.is_available() {
            return ClarificationVerdict::Clear;
        }

        match self.consult_provider(question, entities, language).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::debug!("clarification provider consult failed: {}", e);
                ClarificationVerdict::Clear
            },
        }
    }

    /// Deterministic rules. `None` means the decision falls to the provider.
    pub fn assess_rules(
        &self,
        question: &str,
        intent: Intent,
        entities: &ExtractedEntities,
        language: Language,
    ) -> Option<ClarificationVerdict> {
        // (a) Generic breed: mandatory, rule-based.
        if entities.breed_type == Some(BreedType::Generic) {
            let mut fields = vec![MissingField::Breed];
            if entities.age_days.is_none() {
                fields.push(MissingField::Age);
            }
            if entities.housing.is_none() {
                fields.push(MissingField::Housing);
            }
            return Some(self.request_for(&fields, language));
        }

        // (b) Specific breed with age, and the intent needs no symptoms.
        if entities.breed_type == Some(BreedType::Specific)
            && entities.age_days.is_some()
            && !intent.requires_symptoms()
        {
            return Some(ClarificationVerdict::Clear);
        }

        // (c) Growth/weight metric question missing breed or age.
        if intent == Intent::MetricQuery && is_growth_topic(question) {
            let breed_missing =
                entities.breed.is_none() || entities.breed_type == Some(BreedType::Generic);
            let age_missing = entities.age_days.is_none();
            if breed_missing || age_missing {
                let mut fields = Vec::new();
                if breed_missing {
                    fields.push(MissingField::Breed);
                }
                if age_missing {
                    fields.push(MissingField::Age);
                }
                return Some(self.request_for(&fields, language));
            }
        }

        None
    }

    fn request_for(&self, fields: &[MissingField], language: Language) -> ClarificationVerdict {
        let fields: Vec<MissingField> =
            fields.iter().copied().take(self.config.max_questions).collect();
        let questions = fields
            .iter()
            .map(|f| message(language, clarify_message_id(*f)).to_string())
            .collect();
        ClarificationVerdict::Needed(ClarificationRequest {
            questions,
            missing_fields: fields.iter().map(|f| f.as_str().to_string()).collect(),
        })
    }

    /// Rule (d): a strict prompt that answers either the literal token
    /// `CLEAR` or a newline-separated list of questions.
    async fn consult_provider(
        &self,
        question: &str,
        entities: &ExtractedEntities,
        language: Language,
    ) -> Result<ClarificationVerdict, crate::services::completion::ProviderError> {
        let system = format!(
            "You assess whether a poultry husbandry question can be answered as asked. \
             If it can, respond with the single literal token CLEAR. Otherwise respond with \
             one to three short clarifying questions in language '{}', one per line, nothing else.",
            language.as_str()
        );
        let known = entities.known_field_count();
        let user = format!("Question: {question}\nKnown entity fields: {known}");

        let raw = self.completion.chat(&system, &user).await?;
        let trimmed = raw.trim();

        if trimmed.eq_ignore_ascii_case("clear") {
            return Ok(ClarificationVerdict::Clear);
        }

        let questions: Vec<String> = trimmed
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*', ' ']).to_string())
            .filter(|l| !l.is_empty())
            .take(self.config.max_questions)
            .collect();

        if questions.is_empty() {
            return Ok(ClarificationVerdict::Clear);
        }

        Ok(ClarificationVerdict::Needed(ClarificationRequest {
            questions,
            missing_fields: Vec::new(),
        }))
    }
}

fn is_growth_topic(question: &str) -> bool {
    let normalized = crate::utils::normalize_for_matching(question);
    GROWTH_TERMS.iter().any(|t| normalized.contains(t))
}

fn clarify_message_id(field: MissingField) -> MessageId {
    match field {
        MissingField::Breed => MessageId::ClarifyBreed,
        MissingField::Age => MessageId::ClarifyAge,
        MissingField::Sex => MessageId::ClarifySex,
        MissingField::Housing => MessageId::ClarifyHousing,
        MissingField::FlockSize => MessageId::ClarifyFlockSize,
        MissingField::Symptoms => MessageId::ClarifySymptoms,
        MissingField::Metric => MessageId::ClarifyMetric,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClarificationConfig, ProviderConfig};
    use crate::models::Scored;

    fn engine() -> ClarificationEngine {
        ClarificationEngine::new(
            ClarificationConfig::default(),
            Arc::new(CompletionClient::new(ProviderConfig::default())),
        )
    }

    fn generic_entities() -> ExtractedEntities {
        ExtractedEntities {
            breed: Some(Scored::new("poulets".to_string(), 0.8)),
            breed_type: Some(BreedType::Generic),
            ..Default::default()
        }
    }

    #[test]
    fn generic_breed_triggers_rule_based_clarification() {
        let verdict = engine()
            .assess_rules(
                "Mes poulets ne grossissent pas",
                Intent::DiagnosisTriage,
                &generic_entities(),
                Language::Fr,
            )
            .expect("rule should decide");

        match verdict {
            ClarificationVerdict::Needed(req) => {
                assert!(req.questions.len() >= 2 && req.questions.len() <= 3);
                assert_eq!(req.questions[0], message(Language::Fr, MessageId::ClarifyBreed));
                assert_eq!(req.missing_fields[0], "breed");
                assert!(req.missing_fields.contains(&"age".to_string()));
                assert!(req.missing_fields.contains(&"housing".to_string()));
            },
            ClarificationVerdict::Clear => panic!("generic breed must clarify"),
        }
    }

    #[test]
    fn specific_breed_with_age_is_clear() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            breed_type: Some(BreedType::Specific),
            age_days: Some(Scored::new(35, 0.9)),
            ..Default::default()
        };
        let verdict = engine()
            .assess_rules("target weight?", Intent::MetricQuery, &entities, Language::En)
            .expect("rule should decide");
        assert!(verdict.is_clear());
    }

    #[test]
    fn growth_metric_query_missing_age_clarifies() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("cobb_500".to_string(), 0.9)),
            breed_type: Some(BreedType::Specific),
            ..Default::default()
        };
        let verdict = engine()
            .assess_rules(
                "what body weight should cobb 500 reach?",
                Intent::MetricQuery,
                &entities,
                Language::En,
            )
            .expect("rule should decide");
        match verdict {
            ClarificationVerdict::Needed(req) => {
                assert_eq!(req.missing_fields, vec!["age".to_string()]);
            },
            ClarificationVerdict::Clear => panic!("missing age must clarify"),
        }
    }

    #[test]
    fn questions_are_capped_at_three() {
        let verdict = engine()
            .assess_rules("mes poulets", Intent::GeneralPoultry, &generic_entities(), Language::Fr)
            .expect("rule should decide");
        if let ClarificationVerdict::Needed(req) = verdict {
            assert!(req.questions.len() <= 3);
        }
    }

    #[tokio::test]
    async fn unavailable_provider_defaults_to_clear() {
        // No rules fire for a protocol question with a specific breed but no
        // age; with the provider unavailable the verdict must stay clear.
        let entities = ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            breed_type: Some(BreedType::Specific),
            ..Default::default()
        };
        let verdict = engine()
            .assess("vaccination schedule?", Intent::ProtocolQuery, &entities, Language::En)
            .await;
        assert!(verdict.is_clear());
    }
}
