use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragmill_core::chunker::{ChunkerConfig, StrategyKind};
use ragmill_core::search::FusionPolicy;

/// Characters per token used to convert token budgets into character
/// budgets for the chunkers.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    #[serde(default = "default_parent_max_tokens")]
    pub parent_max_tokens: usize,
    #[serde(default = "default_child_max_tokens")]
    pub child_max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
            semantic_threshold: default_semantic_threshold(),
            parent_max_tokens: default_parent_max_tokens(),
            child_max_tokens: default_child_max_tokens(),
        }
    }
}

fn default_strategy() -> String {
    "fixed".to_string()
}
fn default_max_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    50
}
fn default_semantic_threshold() -> f32 {
    0.45
}
fn default_parent_max_tokens() -> usize {
    1200
}
fn default_child_max_tokens() -> usize {
    100
}

impl ChunkingConfig {
    pub fn strategy_kind(&self) -> Result<StrategyKind> {
        Ok(StrategyKind::parse(&self.strategy)?)
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.max_tokens * CHARS_PER_TOKEN,
            overlap_chars: self.overlap_tokens * CHARS_PER_TOKEN,
            semantic_threshold: self.semantic_threshold,
            parent_max_chars: self.parent_max_tokens * CHARS_PER_TOKEN,
            child_max_chars: self.child_max_tokens * CHARS_PER_TOKEN,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Fusion policy: `vector`, `weighted`, or `rrf`.
    #[serde(default = "default_fusion")]
    pub fusion: String,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy_weight: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_rerank_multiplier")]
    pub rerank_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            fusion: default_fusion(),
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
            fuzzy_weight: default_fuzzy_weight(),
            rrf_k: default_rrf_k(),
            rerank_multiplier: default_rerank_multiplier(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_min_score() -> f64 {
    0.2
}
fn default_fusion() -> String {
    "vector".to_string()
}
fn default_vector_weight() -> f64 {
    0.6
}
fn default_lexical_weight() -> f64 {
    0.25
}
fn default_fuzzy_weight() -> f64 {
    0.15
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_rerank_multiplier() -> usize {
    4
}

impl RetrievalConfig {
    pub fn fusion_policy(&self) -> Result<FusionPolicy> {
        match self.fusion.as_str() {
            "vector" => Ok(FusionPolicy::VectorOnly),
            "weighted" => Ok(FusionPolicy::WeightedSum {
                vector: self.vector_weight,
                lexical: self.lexical_weight,
                fuzzy: self.fuzzy_weight,
            }),
            "rrf" => Ok(FusionPolicy::ReciprocalRank { k: self.rrf_k }),
            other => anyhow::bail!(
                "Unknown retrieval.fusion: '{}'. Must be vector, weighted, or rrf.",
                other
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint for the `http` provider; defaults to the OpenAI
    /// embeddings API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Texts per embeddings request; large documents are embedded in
    /// groups of this size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Documents processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Abort the run after this many failed documents. `0` disables the
    /// threshold.
    #[serde(default)]
    pub max_failures: usize,
    /// Wall-clock budget for the embedding pass of one document.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_failures: 0,
            embed_timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_embed_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    config.chunking.strategy_kind()?;
    config.chunking.chunker_config().validate()?;

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }
    config.retrieval.fusion_policy()?;

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "http" | "hashed" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, http, or hashed.",
            other
        ),
    }

    // Validate ingestion
    if config.ingestion.concurrency == 0 {
        anyhow::bail!("ingestion.concurrency must be >= 1");
    }

    Ok(config)
}
