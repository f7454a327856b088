//! Text normalization helpers shared by the gate, router and extractor.

use std::collections::HashSet;

/// Map accented characters common in French and Spanish questions to their
/// ASCII base letter. Unknown characters pass through unchanged.
pub fn strip_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' | 'õ' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'À' | 'Â' | 'Ä' | 'Á' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Î' | 'Ï' | 'Í' => 'I',
            'Ô' | 'Ö' | 'Ó' => 'O',
            'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
            'Ç' => 'C',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Lowercase, strip diacritics, replace non-word characters with spaces and
/// collapse runs of whitespace. Matching dictionaries assume this form.
pub fn normalize_for_matching(text: &str) -> String {
    let lowered = strip_diacritics(&text.to_lowercase());
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Words longer than three characters, used for coherence overlap checks.
pub fn content_words(text: &str) -> HashSet<String> {
    normalize_for_matching(text)
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_french_accents() {
        assert_eq!(strip_diacritics("mortalité élevée"), "mortalite elevee");
        assert_eq!(strip_diacritics("poulets âgés"), "poulets ages");
    }

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(
            normalize_for_matching("Quel est le POIDS, à 35 jours ?"),
            "quel est le poids a 35 jours"
        );
    }

    #[test]
    fn content_words_drop_short_tokens() {
        let words = content_words("le poids du poulet est bas");
        assert!(words.contains("poids"));
        assert!(words.contains("poulet"));
        assert!(!words.contains("le"));
        assert!(!words.contains("est"));
    }
}
