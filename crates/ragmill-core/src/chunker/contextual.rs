//! Contextual chunker: document-level context prepended to every chunk.
//!
//! A short document summary, produced by an external collaborator behind
//! [`ContextProvider`], is prepended to each fixed-window chunk before
//! embedding. The stored text is the contextualized version, which makes
//! short chunks meaningful in isolation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkDraft, NormalizedDocument};

use super::fixed::FixedWindowChunker;
use super::ChunkStrategy;

/// External collaborator that produces a short document-level context
/// string (typically an LLM summarization call).
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn document_context(&self, doc: &NormalizedDocument) -> Result<String>;
}

pub struct ContextualChunker {
    provider: Arc<dyn ContextProvider>,
    inner: FixedWindowChunker,
}

impl ContextualChunker {
    pub fn new(provider: Arc<dyn ContextProvider>, max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            provider,
            inner: FixedWindowChunker::new(max_chars, overlap_chars),
        }
    }
}

#[async_trait]
impl ChunkStrategy for ContextualChunker {
    fn name(&self) -> &'static str {
        "contextual"
    }

    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>> {
        let context = self.provider.document_context(doc).await?;
        let context = context.trim();
        let mut drafts = self.inner.split(doc).await?;

        if !context.is_empty() {
            for draft in &mut drafts {
                draft.text = format!("{context}\n\n{}", draft.text);
            }
        }

        Ok(drafts)
    }
}
