//! Typed entities extracted from user questions.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A value paired with the extraction confidence that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub value: T,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl<T> Scored<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self { value, confidence: confidence.clamp(0.0, 1.0) }
    }
}

/// Whether the user named a concrete strain or only said "chicken".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedType {
    /// A known commercial strain identifier (e.g. `ross_308`).
    Specific,
    /// A bare species term; the primary trigger for clarification.
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Mixed,
    #[default]
    AsHatched,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Mixed => "mixed",
            Self::AsHatched => "as_hatched",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedBase {
    Corn,
    Wheat,
}

/// Question intent, derived from keyword scoring over the query and entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MetricQuery,
    EnvironmentSetting,
    ProtocolQuery,
    DiagnosisTriage,
    EconomicsCost,
    GeneralPoultry,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetricQuery => "metric_query",
            Self::EnvironmentSetting => "environment_setting",
            Self::ProtocolQuery => "protocol_query",
            Self::DiagnosisTriage => "diagnosis_triage",
            Self::EconomicsCost => "economics_cost",
            Self::GeneralPoultry => "general_poultry",
        }
    }

    /// Diagnosis questions are answerable without breed and age but need
    /// observed symptoms instead.
    pub fn requires_symptoms(&self) -> bool {
        matches!(self, Self::DiagnosisTriage)
    }
}

/// A critical field the clarification engine may ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    Breed,
    Age,
    Sex,
    Housing,
    FlockSize,
    Symptoms,
    Metric,
}

impl MissingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breed => "breed",
            Self::Age => "age",
            Self::Sex => "sex",
            Self::Housing => "housing",
            Self::FlockSize => "flock_size",
            Self::Symptoms => "symptoms",
            Self::Metric => "metric",
        }
    }
}

/// Structured record of everything the extractor recognized in a question.
///
/// Fields named in the current query override those inherited from history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub breed: Option<Scored<String>>,
    pub breed_type: Option<BreedType>,
    pub sex: Option<Scored<Sex>>,
    pub age_days: Option<Scored<u32>>,
    pub flock_size: Option<Scored<u32>>,
    pub temperature_c: Option<Scored<f64>>,
    pub density_per_m2: Option<Scored<u32>>,
    pub target_weight_g: Option<Scored<f64>>,
    pub fcr: Option<Scored<f64>>,
    pub mortality_pct: Option<Scored<f64>>,
    pub symptoms: Vec<String>,
    pub housing: Option<Scored<String>>,
    pub feed_base: Option<Scored<FeedBase>>,
    pub antibiotic_free: Option<Scored<bool>>,
}

impl ExtractedEntities {
    /// Number of populated fields; used by the complexity classifier.
    pub fn known_field_count(&self) -> usize {
        let mut count = 0;
        count += self.breed.is_some() as usize;
        count += self.sex.is_some() as usize;
        count += self.age_days.is_some() as usize;
        count += self.flock_size.is_some() as usize;
        count += self.temperature_c.is_some() as usize;
        count += self.density_per_m2.is_some() as usize;
        count += self.target_weight_g.is_some() as usize;
        count += self.fcr.is_some() as usize;
        count += self.mortality_pct.is_some() as usize;
        count += (!self.symptoms.is_empty()) as usize;
        count += self.housing.is_some() as usize;
        count += self.feed_base.is_some() as usize;
        count += self.antibiotic_free.is_some() as usize;
        count
    }

    /// Critical fields absent for the given intent, in clarification order.
    pub fn missing_critical(&self, intent: Intent) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.breed.is_none() || self.breed_type == Some(BreedType::Generic) {
            missing.push(MissingField::Breed);
        }
        if self.age_days.is_none() {
            missing.push(MissingField::Age);
        }
        if intent.requires_symptoms() && self.symptoms.is_empty() {
            missing.push(MissingField::Symptoms);
        }
        if intent == Intent::EnvironmentSetting && self.housing.is_none() {
            missing.push(MissingField::Housing);
        }
        missing
    }

    /// Inherit fields from an earlier turn without overriding anything the
    /// current query named.
    pub fn inherit_from(&mut self, prior: &ExtractedEntities) {
        if self.breed.is_none() {
            self.breed = prior.breed.clone();
            self.breed_type = self.breed_type.or(prior.breed_type);
        }
        if self.sex.is_none() {
            self.sex = prior.sex.clone();
        }
        if self.age_days.is_none() {
            self.age_days = prior.age_days.clone();
        }
        if self.flock_size.is_none() {
            self.flock_size = prior.flock_size.clone();
        }
        if self.temperature_c.is_none() {
            self.temperature_c = prior.temperature_c.clone();
        }
        if self.density_per_m2.is_none() {
            self.density_per_m2 = prior.density_per_m2.clone();
        }
        if self.target_weight_g.is_none() {
            self.target_weight_g = prior.target_weight_g.clone();
        }
        if self.fcr.is_none() {
            self.fcr = prior.fcr.clone();
        }
        if self.mortality_pct.is_none() {
            self.mortality_pct = prior.mortality_pct.clone();
        }
        if self.antibiotic_free.is_none() {
            self.antibiotic_free = prior.antibiotic_free.clone();
        }
        if self.housing.is_none() {
            self.housing = prior.housing.clone();
        }
        if self.feed_base.is_none() {
            self.feed_base = prior.feed_base.clone();
        }
        if self.symptoms.is_empty() {
            self.symptoms = prior.symptoms.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_clamps_confidence() {
        assert_eq!(Scored::new(1u32, 1.7).confidence, 1.0);
        assert_eq!(Scored::new(1u32, -0.2).confidence, 0.0);
    }

    #[test]
    fn current_query_overrides_history() {
        let mut current = ExtractedEntities {
            age_days: Some(Scored::new(35, 0.9)),
            ..Default::default()
        };
        let prior = ExtractedEntities {
            age_days: Some(Scored::new(21, 0.9)),
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            breed_type: Some(BreedType::Specific),
            ..Default::default()
        };

        current.inherit_from(&prior);

        assert_eq!(current.age_days.as_ref().map(|a| a.value), Some(35));
        assert_eq!(current.breed.as_ref().map(|b| b.value.as_str()), Some("ross_308"));
        assert_eq!(current.breed_type, Some(BreedType::Specific));
    }

    #[test]
    fn every_unnamed_field_carries_forward() {
        let mut current = ExtractedEntities::default();
        let prior = ExtractedEntities {
            target_weight_g: Some(Scored::new(2400.0, 0.9)),
            fcr: Some(Scored::new(1.6, 0.9)),
            antibiotic_free: Some(Scored::new(true, 0.9)),
            ..Default::default()
        };

        current.inherit_from(&prior);

        assert_eq!(current.target_weight_g.as_ref().map(|w| w.value), Some(2400.0));
        assert_eq!(current.fcr.as_ref().map(|f| f.value), Some(1.6));
        assert_eq!(current.antibiotic_free.as_ref().map(|a| a.value), Some(true));
    }

    #[test]
    fn generic_breed_counts_as_missing() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("chicken".to_string(), 0.8)),
            breed_type: Some(BreedType::Generic),
            age_days: Some(Scored::new(21, 0.9)),
            ..Default::default()
        };
        let missing = entities.missing_critical(Intent::MetricQuery);
        assert!(missing.contains(&MissingField::Breed));
        assert!(!missing.contains(&MissingField::Age));
    }
}
