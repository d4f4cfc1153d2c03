//! Chunking strategies.
//!
//! Every strategy implements one contract: [`ChunkStrategy::split`] turns
//! a [`NormalizedDocument`] into an ordered sequence of [`ChunkDraft`]s.
//! Indices become dense and zero-based when the batch is materialized by
//! [`crate::models::build_chunks`]; no strategy may emit empty text.
//!
//! Strategy choice is a per-ingestion configuration option:
//!
//! | Kind | Module | External needs |
//! |------|--------|----------------|
//! | `fixed` | [`fixed`] | none |
//! | `semantic` | [`semantic`] | [`Embedder`] |
//! | `hierarchical` | [`hierarchical`] | none |
//! | `contextual` | [`contextual`] | [`ContextProvider`](contextual::ContextProvider) |
//! | `late` | [`late`] | [`TokenEmbedder`] |

pub mod contextual;
pub mod fixed;
pub mod hierarchical;
pub mod late;
pub mod semantic;

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{Embedder, TokenEmbedder};
use crate::error::{Error, Result};
use crate::models::{ChunkDraft, NormalizedDocument};

/// Common contract over all chunking strategies.
#[async_trait]
pub trait ChunkStrategy: Send + Sync {
    /// Strategy identifier, stored in source metadata and logs.
    fn name(&self) -> &'static str;

    /// Split a document into ordered chunk drafts.
    async fn split(&self, doc: &NormalizedDocument) -> Result<Vec<ChunkDraft>>;
}

/// Which strategy an ingestion run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Fixed,
    Semantic,
    Hierarchical,
    Contextual,
    Late,
}

impl StrategyKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "fixed" => Ok(StrategyKind::Fixed),
            "semantic" => Ok(StrategyKind::Semantic),
            "hierarchical" => Ok(StrategyKind::Hierarchical),
            "contextual" => Ok(StrategyKind::Contextual),
            "late" => Ok(StrategyKind::Late),
            other => Err(Error::validation(format!(
                "unknown chunking strategy: {other}. Use fixed, semantic, hierarchical, contextual, or late."
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Fixed => "fixed",
            StrategyKind::Semantic => "semantic",
            StrategyKind::Hierarchical => "hierarchical",
            StrategyKind::Contextual => "contextual",
            StrategyKind::Late => "late",
        }
    }
}

/// Shared tuning knobs for the strategies.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Character budget per chunk (chars ≈ tokens × 4).
    pub max_chars: usize,
    /// Overlap between adjacent windows on hard splits.
    pub overlap_chars: usize,
    /// Boundary threshold for semantic chunking: a new chunk starts when
    /// adjacent-sentence cosine similarity drops below this value.
    pub semantic_threshold: f32,
    /// Parent chunk budget for hierarchical chunking.
    pub parent_max_chars: usize,
    /// Child chunk budget for hierarchical chunking.
    pub child_max_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1600,
            overlap_chars: 200,
            semantic_threshold: 0.45,
            parent_max_chars: 4800,
            child_max_chars: 400,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(Error::validation("chunking.max_chars must be > 0"));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(Error::validation(
                "chunking.overlap_chars must be smaller than max_chars",
            ));
        }
        if self.child_max_chars == 0 || self.child_max_chars >= self.parent_max_chars {
            return Err(Error::validation(
                "chunking.child_max_chars must be positive and smaller than parent_max_chars",
            ));
        }
        if !(-1.0..=1.0).contains(&self.semantic_threshold) {
            return Err(Error::validation(
                "chunking.semantic_threshold must be in [-1.0, 1.0]",
            ));
        }
        Ok(())
    }
}

/// External collaborators a strategy may require.
#[derive(Default, Clone)]
pub struct StrategyDeps {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub token_embedder: Option<Arc<dyn TokenEmbedder>>,
    pub context_provider: Option<Arc<dyn contextual::ContextProvider>>,
}

/// Build the configured strategy, validating that its collaborators are
/// available.
pub fn build_strategy(
    kind: StrategyKind,
    config: &ChunkerConfig,
    deps: &StrategyDeps,
) -> Result<Box<dyn ChunkStrategy>> {
    config.validate()?;
    match kind {
        StrategyKind::Fixed => Ok(Box::new(fixed::FixedWindowChunker::new(
            config.max_chars,
            config.overlap_chars,
        ))),
        StrategyKind::Semantic => {
            let embedder = deps.embedder.clone().ok_or_else(|| {
                Error::validation("semantic chunking requires an embedder")
            })?;
            Ok(Box::new(semantic::SemanticChunker::new(
                embedder,
                config.semantic_threshold,
                config.max_chars,
            )))
        }
        StrategyKind::Hierarchical => Ok(Box::new(hierarchical::HierarchicalChunker::new(
            config.parent_max_chars,
            config.child_max_chars,
        ))),
        StrategyKind::Contextual => {
            let provider = deps.context_provider.clone().ok_or_else(|| {
                Error::validation("contextual chunking requires a context provider")
            })?;
            Ok(Box::new(contextual::ContextualChunker::new(
                provider,
                config.max_chars,
                config.overlap_chars,
            )))
        }
        StrategyKind::Late => {
            let token_embedder = deps.token_embedder.clone().ok_or_else(|| {
                Error::validation("late chunking requires a token-level embedder")
            })?;
            Ok(Box::new(late::LateChunker::new(
                token_embedder,
                config.max_chars,
            )))
        }
    }
}
