//! Embedder traits and vector utilities.
//!
//! The embedding model is an external collaborator behind [`Embedder`]:
//! a black-box `embed(text) -> vector` with a fixed dimension and a stable
//! model identifier. Late chunking additionally requires token-level
//! output, expressed by [`TokenEmbedder`].
//!
//! Vector helpers ([`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`])
//! are pure functions shared by store backends.

use async_trait::async_trait;

use crate::error::Result;

/// Batch embedding interface.
///
/// `embed_batch` preserves input order and is all-or-nothing: callers must
/// not persist chunks for a batch that failed. Implementations map
/// upstream failures to [`crate::Error::Embedding`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Stable model identifier (e.g. `"text-embedding-3-small"`).
    fn model_id(&self) -> &str;

    /// Vector dimensionality; fixed per model.
    fn dimension(&self) -> usize;
}

/// One token-level representation with its byte span in the source text.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    /// Byte offset where the token starts.
    pub start: usize,
    /// Byte offset one past the token end.
    pub end: usize,
    pub vector: Vec<f32>,
}

/// Embedder capable of token-level output, required by late chunking:
/// the whole document is embedded once and per-chunk vectors are pooled
/// from the token representations inside each chunk span.
#[async_trait]
pub trait TokenEmbedder: Send + Sync {
    /// Embed the full text and return one vector per token with offsets.
    async fn embed_tokens(&self, text: &str) -> Result<Vec<TokenEmbedding>>;

    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// Mean-pool a set of token vectors into one chunk vector.
///
/// Returns a zero vector of `dimension` when no tokens fall in the span.
pub fn mean_pool(tokens: &[&TokenEmbedding], dimension: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dimension];
    if tokens.is_empty() {
        return pooled;
    }
    for token in tokens {
        for (acc, v) in pooled.iter_mut().zip(token.vector.iter()) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    for v in &mut pooled {
        *v /= n;
    }
    pooled
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or mismatched lengths, which also
/// excludes cross-dimension comparisons from scoring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
