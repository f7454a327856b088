//! Per-language catalogs for every user-visible string.
//!
//! Clarification templates, warnings, rejection texts and suggested topics
//! are keyed by `MessageId` so no component ever formats raw user-facing
//! prose inline.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Languages supported by the question-answering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fr,
    #[default]
    En,
    Es,
}

impl Language {
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "fr" | "fr-fr" | "fr-ca" => Some(Self::Fr),
            "en" | "en-us" | "en-gb" => Some(Self::En),
            "es" | "es-es" | "es-mx" => Some(Self::Es),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Identifier of a localized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Rejection when the question names an off-domain topic.
    RejectionNonAgricultural,
    /// Rejection when nothing in the question anchors it to poultry.
    RejectionTooGeneral,
    ClarifyBreed,
    ClarifyAge,
    ClarifySex,
    ClarifyHousing,
    ClarifyFlockSize,
    ClarifySymptoms,
    ClarifyMetric,
    WarningBreedMissing,
    WarningAgeMissing,
    WarningCoherenceMismatch,
    ApologyNoResults,
    NoPerformanceData,
}

/// Look up a localized message by id.
pub fn message(lang: Language, id: MessageId) -> &'static str {
    use Language::*;
    use MessageId::*;
    match (lang, id) {
        (Fr, RejectionNonAgricultural) => {
            "Je suis un expert du domaine avicole et je ne peux pas répondre à des questions hors de ce domaine. Si vous avez des questions sur l'élevage de volailles, je serai ravi de vous aider."
        },
        (En, RejectionNonAgricultural) => {
            "I am an expert in the poultry field and cannot answer questions outside this domain. If you have questions about poultry farming, I would be happy to help."
        },
        (Es, RejectionNonAgricultural) => {
            "Soy un experto en el campo avícola y no puedo responder preguntas fuera de este dominio. Si tiene preguntas sobre avicultura, estaré encantado de ayudarle."
        },
        (Fr, RejectionTooGeneral) => {
            "Cette question semble trop générale ou ne contient pas assez d'éléments spécifiques au domaine avicole. Pouvez-vous la reformuler en précisant l'aspect d'élevage, de santé animale ou de nutrition qui vous intéresse ?"
        },
        (En, RejectionTooGeneral) => {
            "This question seems too general or doesn't contain enough elements specific to the poultry domain. Could you rephrase it, specifying the husbandry, animal-health or nutrition aspect you are interested in?"
        },
        (Es, RejectionTooGeneral) => {
            "Esta pregunta parece demasiado general o no contiene suficientes elementos específicos del dominio avícola. ¿Podría reformularla especificando el aspecto de cría, salud animal o nutrición que le interesa?"
        },
        (Fr, ClarifyBreed) => "Quelle est la race ou souche de vos volailles (Ross 308, Cobb 500, ...) ?",
        (En, ClarifyBreed) => "What is the breed or strain of your poultry (Ross 308, Cobb 500, ...)?",
        (Es, ClarifyBreed) => "¿Cuál es la raza o cepa de sus aves (Ross 308, Cobb 500, ...)?",
        (Fr, ClarifyAge) => "Quel est l'âge de vos volailles (en jours ou en semaines) ?",
        (En, ClarifyAge) => "What is the age of your poultry (in days or weeks)?",
        (Es, ClarifyAge) => "¿Cuál es la edad de sus aves (en días o semanas)?",
        (Fr, ClarifySex) => "S'agit-il de mâles, de femelles ou d'un troupeau mixte ?",
        (En, ClarifySex) => "Are these males, females, or a mixed flock?",
        (Es, ClarifySex) => "¿Son machos, hembras o un lote mixto?",
        (Fr, ClarifyHousing) => "Quel type de logement utilisez-vous (bâtiment fermé, plein air, volière) ?",
        (En, ClarifyHousing) => "What type of housing do you use (closed barn, free range, aviary)?",
        (Es, ClarifyHousing) => "¿Qué tipo de alojamiento utiliza (nave cerrada, aire libre, aviario)?",
        (Fr, ClarifyFlockSize) => "Combien d'oiseaux compte votre troupeau ?",
        (En, ClarifyFlockSize) => "How many birds are in your flock?",
        (Es, ClarifyFlockSize) => "¿Cuántas aves tiene su lote?",
        (Fr, ClarifySymptoms) => "Quels signes ou symptômes observez-vous exactement ?",
        (En, ClarifySymptoms) => "What signs or symptoms exactly are you observing?",
        (Es, ClarifySymptoms) => "¿Qué signos o síntomas observa exactamente?",
        (Fr, ClarifyMetric) => {
            "Quelles données de performance vous intéressent (poids, gain, indice de conversion, mortalité) ?"
        },
        (En, ClarifyMetric) => {
            "Which performance data are you interested in (weight, gain, feed conversion, mortality)?"
        },
        (Es, ClarifyMetric) => {
            "¿Qué datos de rendimiento le interesan (peso, ganancia, índice de conversión, mortalidad)?"
        },
        (Fr, WarningBreedMissing) => {
            "Sans connaître la race exacte, cette réponse reste générale : les performances varient selon la souche."
        },
        (En, WarningBreedMissing) => {
            "Without knowing the exact breed this answer stays general: performance varies by strain."
        },
        (Es, WarningBreedMissing) => {
            "Sin conocer la raza exacta esta respuesta es general: el rendimiento varía según la cepa."
        },
        (Fr, WarningAgeMissing) => {
            "L'âge est déterminant pour évaluer la normalité des paramètres."
        },
        (En, WarningAgeMissing) => "Age is crucial for evaluating whether parameters are normal.",
        (Es, WarningAgeMissing) => {
            "La edad es crucial para evaluar la normalidad de los parámetros."
        },
        (Fr, WarningCoherenceMismatch) => {
            "La réponse pourrait ne pas correspondre exactement à votre question ; vérifiez le contexte avant d'appliquer les conseils."
        },
        (En, WarningCoherenceMismatch) => {
            "The answer may not exactly match your question; check the context before applying the advice."
        },
        (Es, WarningCoherenceMismatch) => {
            "La respuesta podría no corresponder exactamente a su pregunta; verifique el contexto antes de aplicar los consejos."
        },
        (Fr, ApologyNoResults) => {
            "Je n'ai pas trouvé d'information suffisamment fiable pour répondre à votre question. Pouvez-vous la reformuler ou préciser la race, l'âge ou la métrique recherchée ?"
        },
        (En, ApologyNoResults) => {
            "I could not find reliable enough information to answer your question. Could you rephrase it, or specify the breed, age or metric you are looking for?"
        },
        (Es, ApologyNoResults) => {
            "No encontré información suficientemente fiable para responder a su pregunta. ¿Podría reformularla o precisar la raza, la edad o la métrica buscada?"
        },
        (Fr, NoPerformanceData) => {
            "Aucune donnée de performance ne correspond à ces critères. Vérifiez l'espèce, la lignée ou l'âge indiqués."
        },
        (En, NoPerformanceData) => {
            "No performance data matches these criteria. Check the species, line or age you specified."
        },
        (Es, NoPerformanceData) => {
            "Ningún dato de rendimiento coincide con estos criterios. Verifique la especie, la línea o la edad indicadas."
        },
    }
}

/// Topics offered alongside a domain rejection so the user sees what the
/// system can actually answer.
pub fn suggested_topics(lang: Language) -> &'static [&'static str] {
    match lang {
        Language::Fr => &[
            "Problèmes de croissance des poulets de chair (Ross 308, Cobb 500)",
            "Protocoles de vaccination pour volailles (Gumboro, Newcastle, Bronchite)",
            "Gestion de la température optimale dans le poulailler",
            "Programmes d'alimentation starter/grower/finisher",
            "Diagnostic de mortalité élevée en élevage de volailles",
            "Optimisation de l'indice de conversion alimentaire",
        ],
        Language::En => &[
            "Broiler growth problems (Ross 308, Cobb 500)",
            "Poultry vaccination protocols (Gumboro, Newcastle, Bronchitis)",
            "Optimal temperature management in poultry houses",
            "Starter/grower/finisher feeding programs",
            "High mortality diagnosis in poultry farming",
            "Feed conversion ratio optimization",
        ],
        Language::Es => &[
            "Problemas de crecimiento en pollos de engorde (Ross 308, Cobb 500)",
            "Protocolos de vacunación para aves (Gumboro, Newcastle, Bronquitis)",
            "Gestión de temperatura óptima en gallineros",
            "Programas de alimentación iniciador/crecimiento/terminador",
            "Diagnóstico de mortalidad alta en granjas avícolas",
            "Optimización del índice de conversión alimenticia",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_tags() {
        assert_eq!(Language::parse_tag("fr"), Some(Language::Fr));
        assert_eq!(Language::parse_tag("EN-US"), Some(Language::En));
        assert_eq!(Language::parse_tag("de"), None);
    }

    #[test]
    fn every_language_has_rejection_texts() {
        for lang in [Language::Fr, Language::En, Language::Es] {
            assert!(!message(lang, MessageId::RejectionNonAgricultural).is_empty());
            assert!(!message(lang, MessageId::RejectionTooGeneral).is_empty());
            assert!(!suggested_topics(lang).is_empty());
        }
    }
}
