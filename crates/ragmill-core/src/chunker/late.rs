//! Late chunker: embed the whole document first, then pool per chunk.
//!
//! The full text goes through a token-level embedder once; chunk vectors
//! are mean-pooled from the token representations whose spans overlap
//! each chunk window. Every chunk vector therefore carries document-wide
//! context instead of seeing its window in isolation. Drafts come out
//! with `embedding` pre-populated, so the pipeline skips the per-chunk
//! embedding pass for them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{mean_pool, TokenEmbedder};
use crate::error::Result;
use crate::models::{ChunkDraft, NormalizedDocument};

use super::fixed::window_spans;
use super::ChunkStrategy;

pub struct LateChunker {
    token_embedder: Arc<dyn TokenEmbedder>,
    max_chars: usize,
}

impl LateChunker {
    pub fn new(token_embedder: Arc<dyn TokenEmbedder>, max_chars: usize) -> Self {
        Self {
            token_embedder,
            max_chars,
        }
    }
}

#[async_trait]
impl ChunkStrategy for LateChunker {
    fn name(&self) -> &'static str {
        "late"
    }

    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>> {
        let text = doc.full_text();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.token_embedder.embed_tokens(&text).await?;
        let dimension = self.token_embedder.dimension();

        let mut drafts = Vec::new();
        for (start, end) in window_spans(&text, self.max_chars, 0) {
            let piece = text[start..end].trim();
            if piece.is_empty() {
                continue;
            }
            let in_span: Vec<_> = tokens
                .iter()
                .filter(|t| t.start < end && t.end > start)
                .collect();
            let mut draft = ChunkDraft::new(piece.to_string());
            draft.embedding = Some(mean_pool(&in_span, dimension));
            drafts.push(draft);
        }

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TokenEmbedding;

    /// Whitespace tokenizer; each token's vector is one-hot by its
    /// position parity, so pooled chunk vectors are predictable.
    struct WhitespaceTokenEmbedder;

    #[async_trait]
    impl TokenEmbedder for WhitespaceTokenEmbedder {
        async fn embed_tokens(&self, text: &str) -> Result<Vec<TokenEmbedding>> {
            let mut tokens = Vec::new();
            let mut offset = 0usize;
            for (i, word) in text.split(' ').enumerate() {
                if !word.is_empty() {
                    let vector = if i % 2 == 0 {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    };
                    tokens.push(TokenEmbedding {
                        start: offset,
                        end: offset + word.len(),
                        vector,
                    });
                }
                offset += word.len() + 1;
            }
            Ok(tokens)
        }

        fn model_id(&self) -> &str {
            "token-stub"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn drafts_carry_pooled_embeddings() {
        let chunker = LateChunker::new(Arc::new(WhitespaceTokenEmbedder), 24);
        let doc = NormalizedDocument::from_text("alpha beta gamma delta epsilon zeta eta theta");
        let drafts = chunker.split(&doc).await.unwrap();
        assert!(drafts.len() >= 2);
        for d in &drafts {
            let v = d.embedding.as_ref().expect("late drafts are pre-embedded");
            assert_eq!(v.len(), 2);
            // Mean of one-hot token vectors stays on the simplex.
            assert!((v[0] + v[1] - 1.0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn empty_document_yields_no_drafts() {
        let chunker = LateChunker::new(Arc::new(WhitespaceTokenEmbedder), 24);
        let doc = NormalizedDocument::from_text("   ");
        assert!(chunker.split(&doc).await.unwrap().is_empty());
    }
}
