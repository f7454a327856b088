//! Semantic chunking for document ingestion.
//!
//! Prefers paragraph boundaries, falls back to sentence boundaries for
//! oversized paragraphs, and carries a word overlap between consecutive
//! chunks so no context is lost at the seams.

use crate::config::ChunkingConfig;

/// One chunk of a document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub word_count: usize,
}

pub struct SemanticChunker {
    config: ChunkingConfig,
}

impl SemanticChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk a document body assembled from title, abstract and full text.
    pub fn chunk_document(
        &self,
        title: &str,
        abstract_text: &str,
        full_text: Option<&str>,
    ) -> Vec<Chunk> {
        let mut body = String::new();
        if !title.trim().is_empty() {
            body.push_str(title.trim());
            body.push_str("\n\n");
        }
        if !abstract_text.trim().is_empty() {
            body.push_str(abstract_text.trim());
            body.push_str("\n\n");
        }
        if let Some(text) = full_text
            && !text.trim().is_empty()
        {
            body.push_str(text.trim());
        }

        self.chunk_text(&body)
    }

    /// Split free text into chunks of `min_words..=max_words` with
    /// `overlap_words` of trailing context repeated at each boundary.
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        let paragraphs = split_paragraphs(text);
        if paragraphs.is_empty() {
            return Vec::new();
        }

        // Oversized paragraphs are pre-split on sentence boundaries so the
        // accumulation below only ever sees units that fit.
        let mut units: Vec<String> = Vec::new();
        for paragraph in paragraphs {
            if word_count(&paragraph) > self.config.max_words {
                units.extend(self.split_oversized_paragraph(&paragraph));
            } else {
                units.push(paragraph);
            }
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0usize;

        for unit in units {
            let unit_words = word_count(&unit);

            if current_words + unit_words > self.config.max_words && !current.is_empty() {
                let content = current.join("\n\n");
                chunks.push(Chunk { word_count: word_count(&content), content });

                let overlap = self.take_overlap(&current);
                current_words = overlap.iter().map(|p| word_count(p)).sum();
                current = overlap;
            }

            current_words += unit_words;
            current.push(unit);
        }

        if !current.is_empty() {
            let content = current.join("\n\n");
            let words = word_count(&content);
            if words >= self.config.min_words || chunks.is_empty() {
                chunks.push(Chunk { word_count: words, content });
            } else if let Some(last) = chunks.last_mut() {
                // A trailing fragment below the minimum folds into the
                // previous chunk instead of standing alone.
                last.content.push_str("\n\n");
                last.content.push_str(&content);
                last.word_count = word_count(&last.content);
            }
        }

        chunks
    }

    /// Trailing units of the finished chunk totalling at most
    /// `overlap_words`, preserved in order.
    fn take_overlap(&self, units: &[String]) -> Vec<String> {
        let mut overlap: Vec<String> = Vec::new();
        let mut words = 0usize;

        for unit in units.iter().rev() {
            let unit_words = word_count(unit);
            if words + unit_words > self.config.overlap_words {
                break;
            }
            words += unit_words;
            overlap.insert(0, unit.clone());
        }

        overlap
    }

    fn split_oversized_paragraph(&self, paragraph: &str) -> Vec<String> {
        let sentences = split_sentences(paragraph);
        let mut units = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_words = 0usize;

        for sentence in &sentences {
            let sentence_words = word_count(sentence);
            if current_words + sentence_words > self.config.max_words && !current.is_empty() {
                units.push(current.join(" "));
                current.clear();
                current_words = 0;
            }
            current.push(sentence);
            current_words += sentence_words;
        }
        if !current.is_empty() {
            units.push(current.join(" "));
        }

        units
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> SemanticChunker {
        SemanticChunker::new(ChunkingConfig::default())
    }

    fn paragraph(words: usize, seed: &str) -> String {
        std::iter::repeat_n(seed, words).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunks = chunker().chunk_document("Title", &paragraph(80, "word"), None);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_document_respects_max_words() {
        let body: Vec<String> = (0..10).map(|_| paragraph(300, "feed")).collect();
        let chunks = chunker().chunk_text(&body.join("\n\n"));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.word_count <= 1200 + 240, "chunk too large: {}", chunk.word_count);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let marker = paragraph(200, "marker");
        let body = format!(
            "{}\n\n{}\n\n{}",
            paragraph(900, "alpha"),
            marker,
            paragraph(900, "beta")
        );
        let chunks = chunker().chunk_text(&body);
        assert!(chunks.len() >= 2);
        // The marker paragraph ends one chunk and reappears at the start of
        // the next as overlap context.
        let containing: Vec<_> =
            chunks.iter().filter(|c| c.content.contains("marker")).collect();
        assert!(containing.len() >= 2);
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let sentence = format!("{}.", paragraph(100, "grain"));
        let body = std::iter::repeat_n(sentence.as_str(), 20).collect::<Vec<_>>().join(" ");
        let chunks = chunker().chunk_text(&body);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn tiny_trailing_fragment_folds_into_previous_chunk() {
        let body = format!("{}\n\n{}", paragraph(1150, "alpha"), paragraph(20, "tail"));
        let chunks = chunker().chunk_text(&body);
        assert_eq!(chunks.len(), 1 + 0, "expected fold, got {}", chunks.len());
        assert!(chunks[0].content.contains("tail"));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunker().chunk_text("   ").is_empty());
    }
}
