//! Embedding providers behind the core [`Embedder`] trait.
//!
//! - **[`HttpEmbedder`]** calls an OpenAI-compatible embeddings endpoint
//!   with batching, retry, and exponential backoff.
//! - **[`HashedEmbedder`]** is a deterministic local provider that hashes
//!   tokens into a fixed-dimension bag-of-words vector. No network, no
//!   model files; used for development and the test suite.
//!
//! Retry strategy for the HTTP provider:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ragmill_core::embedding::Embedder;
use ragmill_core::projection::tokenize;
use ragmill_core::{Error, Result};

use crate::config::EmbeddingConfig;

/// Embedder for OpenAI-compatible `POST /embeddings` endpoints.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::validation("embedding.model required for http provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::validation("embedding.dims required for http provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::validation("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::embedding)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn call_once(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RetryOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetryOutcome::Retry(Error::embedding(e)))?;

        let status = resp.status();
        if status.is_success() {
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| RetryOutcome::Fatal(Error::embedding(e)))?;
            return parse_embeddings_response(&json).map_err(RetryOutcome::Fatal);
        }

        let text = resp.text().await.unwrap_or_default();
        let err = Error::embedding(format!("embeddings API error {status}: {text}"));
        if status.as_u16() == 429 || status.is_server_error() {
            Err(RetryOutcome::Retry(err))
        } else {
            Err(RetryOutcome::Fatal(err))
        }
    }
}

enum RetryOutcome {
    Retry(Error),
    Fatal(Error),
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::embedding("invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::embedding("invalid embeddings response: missing embedding"))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }
            match self.call_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(RetryOutcome::Retry(e)) => last_err = Some(e),
                Err(RetryOutcome::Fatal(e)) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::embedding("embedding failed after retries")))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims
    }
}

/// Deterministic local embedder: each token hashes into one of `dims`
/// buckets and the bucket counts are L2-normalized. Texts sharing tokens
/// get high cosine similarity, which is enough for development and tests.
pub struct HashedEmbedder {
    model: String,
    dims: usize,
}

impl HashedEmbedder {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dims] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims
    }
}

/// Instantiate the configured embedder, or `None` when embeddings are
/// disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "http" => Ok(Some(Arc::new(HttpEmbedder::new(config)?))),
        "hashed" => {
            let model = config.model.clone().unwrap_or_else(|| "hashed-32".into());
            let dims = config.dims.unwrap_or(32);
            Ok(Some(Arc::new(HashedEmbedder::new(model, dims))))
        }
        other => Err(Error::validation(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}
