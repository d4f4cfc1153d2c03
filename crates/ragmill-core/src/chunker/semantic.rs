//! Semantic chunker: boundaries where adjacent-sentence similarity drops.
//!
//! Sentences are embedded in one batch; a new chunk starts wherever the
//! cosine similarity between a sentence and its predecessor falls below
//! the configured threshold, or the character budget would overflow.
//! Produces variable-length, topically coherent chunks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::{ChunkDraft, NormalizedDocument};

use super::ChunkStrategy;

pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    max_chars: usize,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32, max_chars: usize) -> Self {
        Self {
            embedder,
            threshold,
            max_chars,
        }
    }
}

/// Split text into sentences at terminal punctuation followed by
/// whitespace. Keeps the punctuation with the sentence.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if chars.peek().map_or(true, |n| n.is_whitespace()) {
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
            }
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[async_trait]
impl ChunkStrategy for SemanticChunker {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>> {
        let text = doc.full_text();
        let sentences = split_sentences(&text);
        if sentences.len() <= 1 {
            return Ok(sentences
                .into_iter()
                .map(ChunkDraft::new)
                .collect());
        }

        let vectors = self.embedder.embed_batch(&sentences).await?;

        let mut drafts = Vec::new();
        let mut current = sentences[0].clone();
        for i in 1..sentences.len() {
            let similarity = cosine_similarity(&vectors[i - 1], &vectors[i]);
            let over_budget = current.len() + 1 + sentences[i].len() > self.max_chars;
            if similarity < self.threshold || over_budget {
                drafts.push(ChunkDraft::new(std::mem::replace(
                    &mut current,
                    sentences[i].clone(),
                )));
            } else {
                current.push(' ');
                current.push_str(&sentences[i]);
            }
        }
        drafts.push(ChunkDraft::new(current));

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    /// Embedder that maps each sentence to a fixed vector by lookup, so
    /// boundary placement is fully controlled by the test.
    struct ScriptedEmbedder {
        vectors: Vec<(String, Vec<f32>)>,
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.vectors
                        .iter()
                        .find(|(s, _)| s == t)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| vec![1.0, 0.0])
                })
                .collect())
        }

        fn model_id(&self) -> &str {
            "scripted"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two! Three? Four");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("Revenue grew 12.5 percent. Costs fell.");
        assert_eq!(sentences.len(), 2);
    }

    #[tokio::test]
    async fn boundary_inserted_where_similarity_drops() {
        let embedder = Arc::new(ScriptedEmbedder {
            vectors: vec![
                ("Cats purr.".into(), vec![1.0, 0.0]),
                ("Kittens meow.".into(), vec![0.95, 0.1]),
                ("Stocks fell today.".into(), vec![0.0, 1.0]),
            ],
        });
        let chunker = SemanticChunker::new(embedder, 0.5, 4000);
        let doc = NormalizedDocument::from_text("Cats purr. Kittens meow. Stocks fell today.");
        let drafts = chunker.split(&doc).await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].text, "Cats purr. Kittens meow.");
        assert_eq!(drafts[1].text, "Stocks fell today.");
    }

    #[tokio::test]
    async fn budget_overflow_forces_boundary() {
        let embedder = Arc::new(ScriptedEmbedder { vectors: vec![] });
        // All sentences identical vectors (similarity 1.0) but a tiny budget.
        let chunker = SemanticChunker::new(embedder, 0.5, 16);
        let doc = NormalizedDocument::from_text("Alpha beta gamma. Delta epsilon zeta.");
        let drafts = chunker.split(&doc).await.unwrap();
        assert_eq!(drafts.len(), 2);
    }

    #[tokio::test]
    async fn single_sentence_needs_no_embedding() {
        let embedder = Arc::new(ScriptedEmbedder { vectors: vec![] });
        let chunker = SemanticChunker::new(embedder, 0.5, 4000);
        let doc = NormalizedDocument::from_text("Just one sentence here.");
        let drafts = chunker.split(&doc).await.unwrap();
        assert_eq!(drafts.len(), 1);
    }
}
