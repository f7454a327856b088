//! Public answer types returned by the ask pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Post-hoc coherence verdict between the enriched question and the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Coherence {
    Good,
    Partial,
    Poor,
    #[default]
    Unknown,
}

impl Coherence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Partial => "partial",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        }
    }
}

/// How much the missing information degrades the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceImpact {
    #[default]
    Low,
    Medium,
    High,
}

/// A cited source attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerSource {
    pub title: String,
    /// `perf_store`, `vector_store` or an external adapter name.
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Final synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub confidence: f64,
    pub sources: Vec<AnswerSource>,
    pub coherence: Coherence,
    pub warnings: Vec<String>,
    pub optional_clarifications: Vec<String>,
}

/// Ordered clarification questions, at most three, in the query language.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClarificationRequest {
    pub questions: Vec<String>,
    /// Machine-readable names of the fields being asked about.
    pub missing_fields: Vec<String>,
}

/// Off-domain rejection with localized explanation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainRejection {
    pub reason: String,
    /// `non_agricultural` or `too_general`.
    pub reason_code: String,
    pub confidence: f64,
    pub suggested_topics: Vec<String>,
}

/// Tagged outcome of the ask endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskOutcome {
    Answer(SynthesizedAnswer),
    Clarification(ClarificationRequest),
    Rejected(DomainRejection),
}

/// Health of one collaborator as seen from this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHealth {
    Ok,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthReport {
    pub components: BTreeMap<String, ComponentHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_outcome_serializes_with_type_tag() {
        let outcome = AskOutcome::Clarification(ClarificationRequest {
            questions: vec!["Which breed?".to_string()],
            missing_fields: vec!["breed".to_string()],
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "clarification");
        assert_eq!(json["questions"][0], "Which breed?");
    }

    #[test]
    fn rejection_serializes_with_type_tag() {
        let outcome = AskOutcome::Rejected(DomainRejection {
            reason: "off domain".to_string(),
            reason_code: "non_agricultural".to_string(),
            confidence: 0.0,
            suggested_topics: vec![],
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["reason_code"], "non_agricultural");
    }
}
